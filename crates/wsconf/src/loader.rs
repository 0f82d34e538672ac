//
// loader.rs
//
// ConfigLoader: load cycle, snapshot, change dispatch and update notifications
//

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use arc_swap::ArcSwapOption;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LoaderConfig;
use crate::consolidate::consolidate;
use crate::error::{ConfigError, ConfigResult};
use crate::events::Subscribers;
use crate::merge::{flatten_keys, lookup, overlay};
use crate::parser::JsonConfigParser;
use crate::registry::DefaultsRegistry;
use crate::scheduler::ReloadScheduler;
use crate::workspace::{
    ConfigParser, ConfigSchemaRegistry, ConfigurationInspect, ConfigurationKeys,
    ConfigurationUpdate, ContentResolver, DefaultValueSource, FileChangeEvent, FileChangeSource,
    FolderWorkspace, FsContentResolver, FsStatResolver, MemoryFileSystem, MergedSnapshot,
    NotifyFileChangeSource, SchemaChange, StatResolver, WorkspaceContext, WorkspaceFileCache,
};

/// Field added to returned configuration when any parse error exists
pub const PARSE_ERRORS_KEY: &str = "parseErrors";

/// The collaborators a [`ConfigLoader`] runs over
pub struct LoaderServices {
    pub context: Arc<dyn WorkspaceContext>,
    pub stat: Arc<dyn StatResolver>,
    pub content: Arc<dyn ContentResolver>,
    pub defaults: Arc<dyn DefaultValueSource>,
    pub parser: Arc<dyn ConfigParser>,
    /// Watched for workspace file changes; `None` means changes only arrive
    /// through [`ConfigLoader::on_file_changes`]
    pub changes: Option<Arc<dyn FileChangeSource>>,
    pub registry: Option<Arc<dyn ConfigSchemaRegistry>>,
}

impl LoaderServices {
    pub fn new(
        context: Arc<dyn WorkspaceContext>,
        stat: Arc<dyn StatResolver>,
        content: Arc<dyn ContentResolver>,
        defaults: Arc<dyn DefaultValueSource>,
    ) -> Self {
        Self {
            context,
            stat,
            content,
            defaults,
            parser: Arc::new(JsonConfigParser::default()),
            changes: None,
            registry: None,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ConfigParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_changes(mut self, changes: Arc<dyn FileChangeSource>) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn ConfigSchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Everything served by one in-memory workspace and one defaults registry
    pub fn in_memory(fs: Arc<MemoryFileSystem>, registry: Arc<DefaultsRegistry>) -> Self {
        Self::new(fs.clone(), fs.clone(), fs.clone(), registry.clone())
            .with_changes(fs)
            .with_registry(registry)
    }

    /// A folder on disk, optionally watched for changes
    pub fn for_folder(
        root: &Path,
        registry: Arc<DefaultsRegistry>,
        watch: bool,
    ) -> anyhow::Result<Self> {
        let workspace = FolderWorkspace::new(root)?;
        let watcher = if watch {
            Some(NotifyFileChangeSource::watch(workspace.root())?)
        } else {
            None
        };

        let mut services = Self::new(
            Arc::new(workspace),
            Arc::new(FsStatResolver),
            Arc::new(FsContentResolver),
            registry.clone(),
        )
        .with_registry(registry);
        if let Some(watcher) = watcher {
            services = services.with_changes(Arc::new(watcher));
        }
        Ok(services)
    }
}

struct LoaderInner {
    config: LoaderConfig,
    cache: WorkspaceFileCache,
    defaults: Arc<dyn DefaultValueSource>,
    snapshot: ArcSwapOption<MergedSnapshot>,
    updates: Subscribers<ConfigurationUpdate>,
    scheduler: ReloadScheduler,
    disposed: AtomicBool,
}

impl LoaderInner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Seed → resolve → consolidate → overlay, then publish the snapshot
    async fn load_cycle(&self) -> ConfigResult<Arc<MergedSnapshot>> {
        if self.is_disposed() {
            return Err(ConfigError::Disposed);
        }

        self.cache.ensure_seeded().await;
        let files = self.cache.resolve_all().await;
        let consolidated = consolidate(&files, &self.config);
        let globals = self.defaults.global_defaults().await;
        let merged = overlay(&globals.contents, &consolidated.contents);

        // Results of a cycle that outlived dispose are dropped
        if self.is_disposed() {
            return Err(ConfigError::Disposed);
        }

        let snapshot = Arc::new(MergedSnapshot {
            merged,
            consolidated,
            globals,
        });
        self.snapshot.store(Some(snapshot.clone()));
        log::debug!(
            "Loaded configuration from {} workspace files ({} parse errors)",
            files.len(),
            snapshot.parse_errors().len()
        );
        Ok(snapshot)
    }

    fn current(&self) -> ConfigResult<Arc<MergedSnapshot>> {
        if self.is_disposed() {
            return Err(ConfigError::Disposed);
        }
        self.snapshot.load_full().ok_or(ConfigError::NotInitialized)
    }

    fn dispatch_changes(&self, events: &[FileChangeEvent]) -> bool {
        if self.is_disposed() {
            return false;
        }
        let mut relevant = false;
        for event in events {
            relevant |= self.cache.apply_change(event);
        }
        if relevant {
            self.scheduler.trigger();
        } else {
            log::trace!("Ignoring {} unrelated file changes", events.len());
        }
        relevant
    }

    fn dispatch_schema_change(&self, change: &SchemaChange) {
        if self.is_disposed() {
            return;
        }
        log::trace!("Defaults changed for {:?}; scheduling reload", change.keys);
        self.scheduler.trigger();
    }

    /// Run when the debounce fires. The cycle runs in its own task so that a
    /// panic inside a collaborator is caught and logged.
    async fn scheduled_reload(self: Arc<Self>) {
        if self.is_disposed() {
            return;
        }
        if self.snapshot.load().is_none() {
            log::trace!("Not initialized yet; initialize will pick up pending changes");
            return;
        }

        let inner = self.clone();
        let cycle = tokio::spawn(async move { inner.load_cycle().await });
        match cycle.await {
            Ok(Ok(snapshot)) => {
                let update = ConfigurationUpdate {
                    config: present(&snapshot, None),
                };
                let delivered = self.updates.send(&update);
                log::trace!("Configuration update delivered to {} subscribers", delivered);
            }
            Ok(Err(ConfigError::Disposed)) => {
                log::trace!("Loader disposed during reload; discarding result");
            }
            Ok(Err(e)) => log::error!("Unexpected error reloading configuration: {}", e),
            Err(e) => log::error!("Unexpected error reloading configuration: {}", e),
        }
    }
}

/// Loads workspace configuration over global defaults and keeps it current.
///
/// Must be created inside a Tokio runtime: change sources are consumed by a
/// background task started in [`ConfigLoader::new`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use serde_json::json;
/// use wsconf::{ConfigLoader, DefaultsRegistry, LoaderConfig, LoaderServices, MemoryFileSystem};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> anyhow::Result<()> {
/// let fs = Arc::new(MemoryFileSystem::new("file:///project")?);
/// fs.write(".vscode/settings.json", r#"{"b": 3}"#);
/// let registry = Arc::new(DefaultsRegistry::with_defaults(json!({"a": 1, "b": 2})));
///
/// let loader = ConfigLoader::new(
///     LoaderConfig::default(),
///     LoaderServices::in_memory(fs, registry),
/// );
/// loader.initialize().await?;
/// assert_eq!(loader.get_configuration(None)?, json!({"a": 1, "b": 3}));
/// # Ok(())
/// # }
/// ```
pub struct ConfigLoader {
    inner: Arc<LoaderInner>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigLoader {
    pub fn new(config: LoaderConfig, services: LoaderServices) -> Self {
        let LoaderServices {
            context,
            stat,
            content,
            defaults,
            parser,
            changes,
            registry,
        } = services;

        let debounce = config.debounce();
        let inner = Arc::new_cyclic(|weak: &Weak<LoaderInner>| {
            let weak = weak.clone();
            let scheduler = ReloadScheduler::from_fn(debounce, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.scheduled_reload().await;
                    }
                }
            });
            LoaderInner {
                cache: WorkspaceFileCache::new(config.clone(), context, stat, content, parser),
                config,
                defaults,
                snapshot: ArcSwapOption::empty(),
                updates: Subscribers::new(),
                scheduler,
                disposed: AtomicBool::new(false),
            }
        });

        let shutdown = CancellationToken::new();
        let change_rx = changes.map(|source| source.subscribe());
        let schema_rx = registry.map(|registry| registry.subscribe());
        let dispatcher = if change_rx.is_some() || schema_rx.is_some() {
            Some(spawn_dispatcher(
                inner.clone(),
                shutdown.clone(),
                change_rx,
                schema_rx,
            ))
        } else {
            None
        };

        Self {
            inner,
            shutdown,
            dispatcher: Mutex::new(dispatcher),
        }
    }

    /// Run the first load cycle. Reads fail with `NotInitialized` until this
    /// completes.
    pub async fn initialize(&self) -> ConfigResult<()> {
        self.inner.load_cycle().await?;
        log::info!("Workspace configuration initialized");
        Ok(())
    }

    /// The merged configuration, or the subtree at a dotted `section`.
    ///
    /// A missing section yields `{}`. When any parse error exists (workspace
    /// or global) the list is attached under [`PARSE_ERRORS_KEY`].
    pub fn get_configuration(&self, section: Option<&str>) -> ConfigResult<Value> {
        let snapshot = self.inner.current()?;
        Ok(present(&snapshot, section))
    }

    /// Run a fresh load cycle, replace the snapshot, and return the result as
    /// [`ConfigLoader::get_configuration`] would
    pub async fn load_configuration(&self, section: Option<&str>) -> ConfigResult<Value> {
        let snapshot = self.inner.load_cycle().await?;
        Ok(present(&snapshot, section))
    }

    /// Whether the cache holds the canonical workspace settings file
    pub fn has_workspace_configuration(&self) -> bool {
        self.inner.cache.contains(&self.inner.config.settings_path())
    }

    /// Receive a [`ConfigurationUpdate`] after every reload triggered by a
    /// change. Subscribers are notified in registration order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConfigurationUpdate> {
        self.inner.updates.subscribe()
    }

    /// Apply a batch of change events delivered by the host. Returns whether
    /// any of them touched workspace configuration.
    pub fn on_file_changes(&self, events: &[FileChangeEvent]) -> bool {
        self.inner.dispatch_changes(events)
    }

    /// Schedule a reload because the defaults changed
    pub fn on_schema_change(&self, change: &SchemaChange) {
        self.inner.dispatch_schema_change(change);
    }

    /// The current snapshot, shared with other readers
    pub fn snapshot(&self) -> ConfigResult<Arc<MergedSnapshot>> {
        self.inner.current()
    }

    /// Where a dotted key's value comes from
    pub fn inspect(&self, key: &str) -> ConfigResult<ConfigurationInspect> {
        let snapshot = self.inner.current()?;
        Ok(ConfigurationInspect {
            key: key.to_string(),
            default: lookup(&snapshot.globals.contents, key).cloned(),
            workspace: lookup(&snapshot.consolidated.contents, key).cloned(),
            value: lookup(&snapshot.merged, key).cloned(),
        })
    }

    pub fn keys(&self) -> ConfigResult<ConfigurationKeys> {
        let snapshot = self.inner.current()?;
        Ok(ConfigurationKeys {
            default: flatten_keys(&snapshot.globals.contents),
            workspace: flatten_keys(&snapshot.consolidated.contents),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Cancel any pending reload, detach from change sources, and drop the
    /// cache, snapshot and subscribers. Safe to call more than once.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.scheduler.cancel();
        self.shutdown.cancel();
        if let Some(handle) = self.dispatcher.lock().ok().and_then(|mut d| d.take()) {
            handle.abort();
        }
        self.inner.cache.clear();
        self.inner.snapshot.store(None);
        self.inner.updates.clear();
        log::debug!("Configuration loader disposed");
    }
}

impl Drop for ConfigLoader {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_dispatcher(
    inner: Arc<LoaderInner>,
    shutdown: CancellationToken,
    change_rx: Option<mpsc::UnboundedReceiver<Vec<FileChangeEvent>>>,
    schema_rx: Option<mpsc::UnboundedReceiver<SchemaChange>>,
) -> JoinHandle<()> {
    let mut changes_open = change_rx.is_some();
    let mut schema_open = schema_rx.is_some();
    let mut change_rx = change_rx.unwrap_or_else(|| mpsc::unbounded_channel().1);
    let mut schema_rx = schema_rx.unwrap_or_else(|| mpsc::unbounded_channel().1);

    tokio::spawn(async move {
        while changes_open || schema_open {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = change_rx.recv(), if changes_open => match batch {
                    Some(batch) => {
                        inner.dispatch_changes(&batch);
                    }
                    None => {
                        log::debug!("File change source closed");
                        changes_open = false;
                    }
                },
                change = schema_rx.recv(), if schema_open => match change {
                    Some(change) => inner.dispatch_schema_change(&change),
                    None => {
                        log::debug!("Schema registry closed");
                        schema_open = false;
                    }
                },
            }
        }
        log::trace!("Change dispatcher stopped");
    })
}

/// Narrow a snapshot to `section` and attach parse errors
fn present(snapshot: &MergedSnapshot, section: Option<&str>) -> Value {
    let mut result = match section {
        Some(section) => match lookup(&snapshot.merged, section) {
            Some(value) if !value.is_null() => value.clone(),
            _ => Value::Object(Map::new()),
        },
        None => snapshot.merged.clone(),
    };

    let errors = snapshot.parse_errors();
    if errors.is_empty() {
        return result;
    }
    match &mut result {
        Value::Object(map) => {
            map.insert(
                PARSE_ERRORS_KEY.to_string(),
                Value::Array(errors.into_iter().map(Value::String).collect()),
            );
        }
        // Scalars and arrays have nowhere to carry the list
        _ => log::trace!("Section value is not an object; parse errors not attached"),
    }
    result
}
