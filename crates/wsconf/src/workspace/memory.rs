//
// workspace/memory.rs
//
// In-memory workspace: files live in a map, change events are emitted explicitly
//

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use super::resolver::{ContentResolver, FileChangeSource, StatResolver, WorkspaceContext};
use super::types::{FileChangeEvent, FileChangeType, FileContent, FileStat};
use crate::events::Subscribers;

/// A workspace whose files exist only in memory.
///
/// Writes do not notify anyone by themselves; call [`MemoryFileSystem::emit`]
/// with the batch a real watcher would have produced.
#[derive(Debug)]
pub struct MemoryFileSystem {
    root: Url,
    files: RwLock<BTreeMap<String, String>>,
    dirs: RwLock<BTreeSet<String>>,
    unreadable: RwLock<HashSet<String>>,
    changes: Subscribers<Vec<FileChangeEvent>>,
    stat_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl MemoryFileSystem {
    /// Create an empty workspace rooted at `root` (e.g. `file:///workspace`)
    pub fn new(root: &str) -> anyhow::Result<Self> {
        let mut root = Url::parse(root)?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        Ok(Self {
            root,
            files: RwLock::new(BTreeMap::new()),
            dirs: RwLock::new(BTreeSet::new()),
            unreadable: RwLock::new(HashSet::new()),
            changes: Subscribers::new(),
            stat_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Absolute location of a workspace-relative path
    pub fn location(&self, path: &str) -> Url {
        self.root
            .join(path.trim_start_matches('/'))
            .unwrap_or_else(|_| self.root.clone())
    }

    /// Create or overwrite a file (parent folders are implied)
    pub fn write(&self, path: &str, text: &str) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.to_string(), text.to_string());
        }
    }

    /// Create an empty folder
    pub fn create_dir(&self, path: &str) {
        if let Ok(mut dirs) = self.dirs.write() {
            dirs.insert(path.trim_end_matches('/').to_string());
        }
    }

    /// Remove a file, or a folder and everything below it
    pub fn remove(&self, path: &str) {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        if let Ok(mut files) = self.files.write() {
            files.retain(|p, _| p != path && !p.starts_with(&prefix));
        }
        if let Ok(mut dirs) = self.dirs.write() {
            dirs.retain(|d| d != path && !d.starts_with(&prefix));
        }
    }

    /// Make reads of `path` fail
    pub fn set_unreadable(&self, path: &str, unreadable: bool) {
        if let Ok(mut set) = self.unreadable.write() {
            if unreadable {
                set.insert(path.to_string());
            } else {
                set.remove(path);
            }
        }
    }

    /// Build an event for a workspace-relative path
    pub fn event(&self, path: &str, change_type: FileChangeType) -> FileChangeEvent {
        FileChangeEvent::new(self.location(path), change_type)
    }

    /// Deliver a batch of change events to subscribers
    pub fn emit(&self, events: Vec<FileChangeEvent>) {
        let delivered = self.changes.send(&events);
        log::trace!(
            "MemoryFileSystem: emitted {} events to {} subscribers",
            events.len(),
            delivered
        );
    }

    /// Number of stat calls served so far
    pub fn stat_calls(&self) -> usize {
        self.stat_calls.load(Ordering::SeqCst)
    }

    /// Number of content reads served so far
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{}/", path);
        let in_dirs = self
            .dirs
            .read()
            .map(|d| d.iter().any(|d| d == path || d.starts_with(&prefix)))
            .unwrap_or(false);
        in_dirs
            || self
                .files
                .read()
                .map(|f| f.keys().any(|p| p.starts_with(&prefix)))
                .unwrap_or(false)
    }

    fn children(&self, path: &str) -> Vec<Url> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut names = BTreeSet::new();
        let files = self.files.read().map(|f| f.keys().cloned().collect::<Vec<_>>());
        let dirs = self.dirs.read().map(|d| d.iter().cloned().collect::<Vec<_>>());
        for candidate in files.unwrap_or_default().into_iter().chain(dirs.unwrap_or_default()) {
            if let Some(rest) = candidate.strip_prefix(&prefix) {
                if let Some(name) = rest.split('/').next().filter(|n| !n.is_empty()) {
                    names.insert(format!("{}{}", prefix, name));
                }
            }
        }
        names.iter().map(|p| self.location(p)).collect()
    }
}

impl WorkspaceContext for MemoryFileSystem {
    fn to_workspace_relative(&self, location: &Url) -> Option<String> {
        let rest = location.as_str().strip_prefix(self.root.as_str())?;
        // Stored paths are plain text; locations carry them percent-encoded
        percent_decode(rest.trim_end_matches('/'))
    }

    fn to_location(&self, relative_path: &str) -> Option<Url> {
        self.root.join(relative_path.trim_start_matches('/')).ok()
    }
}

#[async_trait]
impl StatResolver for MemoryFileSystem {
    async fn resolve(&self, location: &Url) -> anyhow::Result<FileStat> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        let path = self
            .to_workspace_relative(location)
            .ok_or_else(|| anyhow!("{} is outside the workspace", location))?;

        let is_file = self
            .files
            .read()
            .map(|f| f.contains_key(&path))
            .unwrap_or(false);
        if is_file {
            return Ok(FileStat {
                location: location.clone(),
                is_directory: false,
                children: None,
            });
        }
        if !self.is_dir(&path) {
            bail!("{} not found", location);
        }
        Ok(FileStat {
            location: location.clone(),
            is_directory: true,
            children: Some(self.children(&path)),
        })
    }
}

#[async_trait]
impl ContentResolver for MemoryFileSystem {
    async fn resolve_one(&self, location: &Url) -> anyhow::Result<FileContent> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let path = self
            .to_workspace_relative(location)
            .ok_or_else(|| anyhow!("{} is outside the workspace", location))?;
        if self
            .unreadable
            .read()
            .map(|u| u.contains(&path))
            .unwrap_or(false)
        {
            bail!("permission denied: {}", location);
        }
        let text = self
            .files
            .read()
            .ok()
            .and_then(|f| f.get(&path).cloned())
            .ok_or_else(|| anyhow!("{} not found", location))?;
        Ok(FileContent {
            location: location.clone(),
            text,
        })
    }
}

impl FileChangeSource for MemoryFileSystem {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<FileChangeEvent>> {
        self.changes.subscribe()
    }
}

/// Decode `%XX` escapes; `None` on a malformed escape or non-UTF-8 result
fn percent_decode(s: &str) -> Option<String> {
    if !s.contains('%') {
        return Some(s.to_string());
    }

    fn hex(b: u8) -> Option<u8> {
        (b as char).to_digit(16).map(|d| d as u8)
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex(*bytes.get(i + 1)?)?;
            let lo = hex(*bytes.get(i + 2)?)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
