//
// registry.rs
//
// Process-wide default values and change notification for them
//

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::events::Subscribers;
use crate::merge::merge_into;
use crate::workspace::{
    ConfigParser, ConfigSchemaRegistry, DefaultValueSource, GlobalDefaults, SchemaChange,
};

/// Holds the global defaults tree and tells subscribers when it changes.
///
/// Handed to the loader twice: once as its [`DefaultValueSource`] and once as
/// its [`ConfigSchemaRegistry`]. Every load cycle clones the current defaults,
/// so registrations never race with a merge in progress.
#[derive(Debug, Default)]
pub struct DefaultsRegistry {
    defaults: RwLock<GlobalDefaults>,
    changes: Subscribers<SchemaChange>,
}

impl DefaultsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(contents: Value) -> Self {
        Self {
            defaults: RwLock::new(GlobalDefaults::new(contents)),
            changes: Subscribers::new(),
        }
    }

    /// Deep-merge `contents` into the defaults and notify subscribers
    pub fn register_defaults(&self, contents: Value) {
        let keys: Vec<String> = contents
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();

        if let Ok(mut defaults) = self.defaults.write() {
            if defaults.contents.is_object() && contents.is_object() {
                merge_into(&mut defaults.contents, &contents);
            } else {
                defaults.contents = contents;
            }
        }

        log::debug!("Registered defaults for {:?}", keys);
        self.notify(SchemaChange { keys });
    }

    /// Replace the parse errors reported alongside the defaults
    pub fn set_parse_errors(&self, errors: Vec<String>) {
        if let Ok(mut defaults) = self.defaults.write() {
            defaults.parse_errors = errors;
        }
        self.notify(SchemaChange::default());
    }

    /// A copy of the current defaults
    pub fn current(&self) -> GlobalDefaults {
        self.defaults
            .read()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Read a defaults file from disk and register its contents. Parse
    /// problems are recorded as global parse errors rather than failing.
    pub async fn load_file(&self, path: &str, parser: &dyn ConfigParser) -> anyhow::Result<()> {
        let text = tokio::fs::read_to_string(path).await?;
        let parsed = parser.parse(path, &text)?;
        if !parsed.parse_errors.is_empty() {
            if let Ok(mut defaults) = self.defaults.write() {
                defaults.parse_errors.extend(parsed.parse_errors.iter().cloned());
            }
        }
        if parsed.is_absent() {
            self.notify(SchemaChange::default());
        } else {
            self.register_defaults(parsed.tree);
        }
        Ok(())
    }

    fn notify(&self, change: SchemaChange) {
        let delivered = self.changes.send(&change);
        log::trace!("Schema change delivered to {} subscribers", delivered);
    }
}

#[async_trait]
impl DefaultValueSource for DefaultsRegistry {
    async fn global_defaults(&self) -> GlobalDefaults {
        self.current()
    }
}

impl ConfigSchemaRegistry for DefaultsRegistry {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SchemaChange> {
        self.changes.subscribe()
    }
}
