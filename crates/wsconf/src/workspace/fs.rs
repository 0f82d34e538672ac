//
// workspace/fs.rs
//
// Local-disk collaborators: folder workspace, tokio::fs stat/content
// resolvers, and a notify-backed change source
//

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use url::Url;

use super::resolver::{ContentResolver, FileChangeSource, StatResolver, WorkspaceContext};
use super::types::{FileChangeEvent, FileChangeType, FileContent, FileStat};
use crate::error::{ConfigError, ConfigResult};
use crate::events::Subscribers;

/// A workspace rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct FolderWorkspace {
    root: PathBuf,
}

impl FolderWorkspace {
    /// The root is canonicalized so that watcher paths (which are reported
    /// fully resolved) map back onto it.
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("workspace root {} is not accessible", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WorkspaceContext for FolderWorkspace {
    fn to_workspace_relative(&self, location: &Url) -> Option<String> {
        let path = location.to_file_path().ok()?;
        let rest = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in rest.components() {
            match component {
                Component::Normal(s) => segments.push(s.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(segments.join("/"))
    }

    fn to_location(&self, relative_path: &str) -> Option<Url> {
        let mut path = self.root.clone();
        for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Url::from_file_path(path).ok()
    }
}

/// Lists directories with `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStatResolver;

#[async_trait]
impl StatResolver for FsStatResolver {
    async fn resolve(&self, location: &Url) -> anyhow::Result<FileStat> {
        let path = location
            .to_file_path()
            .map_err(|_| anyhow!("{} is not a file location", location))?;
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_dir() {
            return Ok(FileStat {
                location: location.clone(),
                is_directory: false,
                children: None,
            });
        }

        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            children.push(entry.path());
        }
        children.sort();

        log::trace!("Listed {} entries in {}", children.len(), path.display());
        Ok(FileStat {
            location: location.clone(),
            is_directory: true,
            children: Some(
                children
                    .into_iter()
                    .filter_map(|p| Url::from_file_path(p).ok())
                    .collect(),
            ),
        })
    }
}

/// Reads files with `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsContentResolver;

#[async_trait]
impl ContentResolver for FsContentResolver {
    async fn resolve_one(&self, location: &Url) -> anyhow::Result<FileContent> {
        let path = location
            .to_file_path()
            .map_err(|_| anyhow!("{} is not a file location", location))?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(FileContent {
            location: location.clone(),
            text,
        })
    }
}

/// Recursive `notify` watcher over a directory, delivering one batch per
/// raw notify event
pub struct NotifyFileChangeSource {
    // Dropping the watcher stops it
    _watcher: Mutex<RecommendedWatcher>,
    subscribers: Arc<Subscribers<Vec<FileChangeEvent>>>,
}

impl NotifyFileChangeSource {
    pub fn watch(root: &Path) -> ConfigResult<Self> {
        let subscribers: Arc<Subscribers<Vec<FileChangeEvent>>> = Arc::new(Subscribers::new());
        let sink = subscribers.clone();

        let watch_error = |source: notify::Error| ConfigError::Watch {
            path: root.display().to_string(),
            source,
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let batch = translate_event(&event);
                    if !batch.is_empty() {
                        sink.send(&batch);
                    }
                }
                Err(e) => log::warn!("Watch error: {}", e),
            }
        })
        .map_err(watch_error)?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(watch_error)?;

        log::info!("Watching {} for configuration changes", root.display());
        Ok(Self {
            _watcher: Mutex::new(watcher),
            subscribers,
        })
    }
}

impl FileChangeSource for NotifyFileChangeSource {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<FileChangeEvent>> {
        self.subscribers.subscribe()
    }
}

/// Map a raw notify event to change events.
///
/// Renames become a delete of the old path and an add of the new one.
/// Access and metadata-only events are dropped.
pub fn translate_event(event: &notify::Event) -> Vec<FileChangeEvent> {
    let change = |path: &PathBuf, change_type: FileChangeType| {
        Url::from_file_path(path)
            .ok()
            .map(|location| FileChangeEvent::new(location, change_type))
    };
    let all = |change_type: FileChangeType| -> Vec<FileChangeEvent> {
        event
            .paths
            .iter()
            .filter_map(|p| change(p, change_type))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => all(FileChangeType::Added),
        EventKind::Remove(_) => all(FileChangeType::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both => {
                let mut out = Vec::new();
                if let Some(from) = event.paths.first() {
                    out.extend(change(from, FileChangeType::Deleted));
                }
                if let Some(to) = event.paths.get(1) {
                    out.extend(change(to, FileChangeType::Added));
                }
                out
            }
            RenameMode::From => all(FileChangeType::Deleted),
            RenameMode::To => all(FileChangeType::Added),
            // Unpaired rename: the path's current existence decides
            RenameMode::Any | RenameMode::Other => event
                .paths
                .iter()
                .filter_map(|p| {
                    let kind = if p.exists() {
                        FileChangeType::Added
                    } else {
                        FileChangeType::Deleted
                    };
                    change(p, kind)
                })
                .collect(),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => all(FileChangeType::Updated),
        _ => Vec::new(),
    }
}
