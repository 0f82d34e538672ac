//
// workspace/file_cache.rs
//
// Cache of parsed workspace configuration files, seeded once and then kept
// current from change events
//

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};

use indexmap::IndexMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use super::resolver::{ConfigParser, ContentResolver, StatResolver, WorkspaceContext};
use super::types::{FileChangeEvent, FileChangeType, FileContent, ParsedFile};
use crate::config::LoaderConfig;
use crate::consolidate::FileMap;

/// How many times `resolve_all` re-reads the cache when it changes mid-wait
const MAX_RESOLVE_ROUNDS: usize = 8;

#[derive(Debug, Clone)]
enum EntryState {
    Pending,
    Ready(Arc<ParsedFile>),
}

/// One cached path. Owns the task resolving it; dropping the entry (replace,
/// remove, clear) aborts that task, so a path never has two resolutions in
/// flight.
struct CacheEntry {
    state: watch::Receiver<EntryState>,
    task: Option<JoinHandle<()>>,
}

impl CacheEntry {
    fn ready(file: Arc<ParsedFile>) -> Self {
        let (_tx, rx) = watch::channel(EntryState::Ready(file));
        Self {
            state: rx,
            task: None,
        }
    }

    fn current(&self) -> Option<Arc<ParsedFile>> {
        match &*self.state.borrow() {
            EntryState::Ready(file) => Some(file.clone()),
            EntryState::Pending => None,
        }
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Default)]
struct CacheState {
    files: IndexMap<String, CacheEntry>,
    /// Bumped on every insert/remove/clear
    generation: u64,
}

/// Collaborators and entries, shared with the listing and resolution tasks
struct CacheShared {
    config: LoaderConfig,
    context: Arc<dyn WorkspaceContext>,
    stat: Arc<dyn StatResolver>,
    content: Arc<dyn ContentResolver>,
    parser: Arc<dyn ConfigParser>,
    state: Mutex<CacheState>,
}

/// Workspace-relative path → pending or resolved [`ParsedFile`].
///
/// The bulk listing of the settings folder happens at most once per cache;
/// afterwards the cache only changes through [`WorkspaceFileCache::apply_change`].
/// The listing runs on its own task, so a caller that stops waiting for it
/// does not cause a second listing. The lock is never held across an `.await`.
pub struct WorkspaceFileCache {
    shared: Arc<CacheShared>,
    /// Flips to `true` once the listing has been applied
    seeded: OnceLock<watch::Receiver<bool>>,
}

impl WorkspaceFileCache {
    pub fn new(
        config: LoaderConfig,
        context: Arc<dyn WorkspaceContext>,
        stat: Arc<dyn StatResolver>,
        content: Arc<dyn ContentResolver>,
        parser: Arc<dyn ConfigParser>,
    ) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                config,
                context,
                stat,
                content,
                parser,
                state: Mutex::new(CacheState::default()),
            }),
            seeded: OnceLock::new(),
        }
    }

    /// List and load the settings folder on first call; later calls wait for
    /// that listing and never start another. Never fails: a missing or
    /// unlistable folder seeds an empty cache.
    pub async fn ensure_seeded(&self) {
        let mut done = self.seeded.get_or_init(|| self.spawn_seed()).clone();
        // Err means the listing task died; the cache stays as it is
        if done.wait_for(|seeded| *seeded).await.is_err() {
            log::debug!("Workspace configuration listing ended early");
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
            .get()
            .map(|done| *done.borrow())
            .unwrap_or(false)
    }

    fn spawn_seed(&self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            shared.seed().await;
            let _ = tx.send(true);
        });
        rx
    }

    /// Apply one change event. Returns whether the event touched workspace
    /// configuration (and so warrants a reload).
    pub fn apply_change(&self, event: &FileChangeEvent) -> bool {
        let shared = &self.shared;
        let Some(path) = shared.context.to_workspace_relative(&event.location) else {
            return false;
        };

        if event.change_type == FileChangeType::Deleted && path == shared.config.settings_folder {
            log::trace!("Settings folder deleted; clearing workspace configuration cache");
            self.clear();
            return true;
        }

        if !shared.config.is_config_file(&path) {
            return false;
        }

        match event.change_type {
            FileChangeType::Added | FileChangeType::Updated => {
                let entry = self.spawn_resolution(path.clone(), event.location.clone());
                if let Ok(mut state) = shared.state.lock() {
                    state.files.insert(path.clone(), entry);
                    state.generation += 1;
                }
                log::trace!("Scheduled re-read of {}", path);
            }
            FileChangeType::Deleted => {
                if let Ok(mut state) = shared.state.lock() {
                    state.files.shift_remove(&path);
                    state.generation += 1;
                }
                log::trace!("Removed {} from workspace configuration cache", path);
            }
        }
        true
    }

    fn spawn_resolution(&self, path: String, location: Url) -> CacheEntry {
        let (tx, rx) = watch::channel(EntryState::Pending);
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let result = shared.content.resolve_one(&location).await;
            let file = resolve_file(shared.parser.as_ref(), &path, result);
            let _ = tx.send(EntryState::Ready(file));
        });
        CacheEntry {
            state: rx,
            task: Some(task),
        }
    }

    /// Wait for every pending entry to settle and return the resolved files
    /// in insertion order.
    ///
    /// If the cache changes while waiting, the wait starts over so the result
    /// reflects the latest entries.
    pub async fn resolve_all(&self) -> FileMap {
        for _ in 0..MAX_RESOLVE_ROUNDS {
            let Some((generation, pending)) = self.pending_entries() else {
                return FileMap::new();
            };

            let mut resolved = FileMap::with_capacity(pending.len());
            for (path, mut rx) in pending {
                // Err means the resolution was superseded and aborted
                if let Ok(state) = rx.wait_for(|s| matches!(s, EntryState::Ready(_))).await {
                    if let EntryState::Ready(file) = &*state {
                        resolved.insert(path, file.clone());
                    }
                }
            }

            if self.generation() == Some(generation) {
                return resolved;
            }
            log::trace!("Workspace configuration changed while resolving; retrying");
        }

        log::debug!("Workspace configuration kept changing; using settled entries only");
        self.settled_files()
    }

    fn pending_entries(&self) -> Option<(u64, Vec<(String, watch::Receiver<EntryState>)>)> {
        let state = self.shared.state.lock().ok()?;
        let entries = state
            .files
            .iter()
            .map(|(path, entry)| (path.clone(), entry.state.clone()))
            .collect();
        Some((state.generation, entries))
    }

    fn generation(&self) -> Option<u64> {
        self.shared.state.lock().ok().map(|s| s.generation)
    }

    fn settled_files(&self) -> FileMap {
        let Ok(state) = self.shared.state.lock() else {
            return FileMap::new();
        };
        state
            .files
            .iter()
            .filter_map(|(path, entry)| Some((path.clone(), entry.current()?)))
            .collect()
    }

    /// Whether the cache holds an entry (pending or resolved) for `path`
    pub fn contains(&self, path: &str) -> bool {
        self.shared
            .state
            .lock()
            .map(|s| s.files.contains_key(path))
            .unwrap_or(false)
    }

    /// Cached paths in insertion order
    pub fn paths(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .map(|s| s.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().map(|s| s.files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, aborting in-flight resolutions. Does not re-arm the
    /// bulk listing.
    pub fn clear(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.files.clear();
            state.generation += 1;
        }
    }
}

impl CacheShared {
    async fn seed(&self) {
        let Some(folder) = self.context.to_location(&self.config.settings_folder) else {
            log::debug!(
                "Settings folder {} has no location; seeding empty cache",
                self.config.settings_folder
            );
            return;
        };

        let stat = match self.stat.resolve(&folder).await {
            Ok(stat) if stat.is_directory => stat,
            Ok(_) => {
                log::debug!("{} is not a folder; seeding empty cache", folder);
                return;
            }
            Err(e) => {
                log::debug!("Unable to list {}: {}; seeding empty cache", folder, e);
                return;
            }
        };

        let candidates: Vec<(String, Url)> = stat
            .children
            .unwrap_or_default()
            .into_iter()
            .filter_map(|location| {
                let path = self.context.to_workspace_relative(&location)?;
                self.config
                    .is_config_file(&path)
                    .then_some((path, location))
            })
            .collect();

        let locations: Vec<Url> = candidates.iter().map(|(_, l)| l.clone()).collect();
        let contents = self.content.resolve_many(&locations).await;

        let parsed: Vec<(String, Arc<ParsedFile>)> = candidates
            .into_iter()
            .zip(contents)
            .map(|((path, _), result)| {
                let file = resolve_file(self.parser.as_ref(), &path, result);
                (path, file)
            })
            .collect();

        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let mut inserted = 0;
        for (path, file) in parsed {
            // A change event may have raced ahead of the listing; its entry is newer.
            if state.files.contains_key(&path) {
                log::trace!("Seed: keeping newer entry for {}", path);
                continue;
            }
            state.files.insert(path, CacheEntry::ready(file));
            inserted += 1;
        }
        state.generation += 1;
        log::debug!("Seeded workspace configuration cache with {} files", inserted);
    }
}

/// Turn a fetch result into a parsed file. Fetch failures, parser errors and
/// parser panics all yield an absent file carrying the reason.
fn resolve_file(
    parser: &dyn ConfigParser,
    path: &str,
    fetched: anyhow::Result<FileContent>,
) -> Arc<ParsedFile> {
    let file = match fetched {
        Ok(content) => parse_guarded(parser, path, &content.text),
        Err(e) => {
            log::error!("Unexpected error: Unable to read {}: {:#}", path, e);
            ParsedFile::with_error(path, format!("Unable to read {}: {}", path, e))
        }
    };
    Arc::new(file)
}

/// Run the parser, turning both its errors and its panics into an error entry
fn parse_guarded(parser: &dyn ConfigParser, path: &str, text: &str) -> ParsedFile {
    let reason = match panic::catch_unwind(AssertUnwindSafe(|| parser.parse(path, text))) {
        Ok(Ok(file)) => return file,
        Ok(Err(e)) => format!("{:#}", e),
        Err(payload) => format!("parser panicked: {}", panic_message(payload.as_ref())),
    };
    log::error!("Unexpected error: Unable to parse {}: {}", path, reason);
    ParsedFile::with_error(path, format!("Unable to parse {}: {}", path, reason))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
