//
// workspace/resolver.rs
//
// Collaborator interfaces consumed by the loader
//
// The loader never touches a filesystem directly. Listing, reading, watching
// and parsing are injected through these traits so that the same core runs
// over the local disk, an in-memory tree, or a host editor's virtual files.
//

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use super::types::{FileChangeEvent, FileContent, FileStat, GlobalDefaults, ParsedFile};

/// Lists a location. Used once per cache lifetime, on the settings folder.
#[async_trait]
pub trait StatResolver: Send + Sync {
    async fn resolve(&self, location: &Url) -> anyhow::Result<FileStat>;
}

/// Fetches file text
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve_one(&self, location: &Url) -> anyhow::Result<FileContent>;

    /// Fetch several locations. Each result stands alone: one failed fetch
    /// does not fail the others. Results are in input order.
    async fn resolve_many(&self, locations: &[Url]) -> Vec<anyhow::Result<FileContent>> {
        let mut results = Vec::with_capacity(locations.len());
        for location in locations {
            results.push(self.resolve_one(location).await);
        }
        results
    }
}

/// Maps between absolute locations and workspace-relative paths
pub trait WorkspaceContext: Send + Sync {
    /// Workspace-relative, `/`-separated path, or `None` when the location
    /// is outside the workspace
    fn to_workspace_relative(&self, location: &Url) -> Option<String>;

    /// Absolute location of a workspace-relative path
    fn to_location(&self, relative_path: &str) -> Option<Url>;
}

/// Supplies the global defaults tree on demand
#[async_trait]
pub trait DefaultValueSource: Send + Sync {
    async fn global_defaults(&self) -> GlobalDefaults;
}

/// Delivers batches of file change events
pub trait FileChangeSource: Send + Sync {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<FileChangeEvent>>;
}

/// Notification that registered defaults or schemas changed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaChange {
    /// Top-level keys touched by the registration, when known
    pub keys: Vec<String>,
}

/// Announces changes to the registered defaults
pub trait ConfigSchemaRegistry: Send + Sync {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SchemaChange>;
}

/// Turns file text into a configuration tree.
///
/// Syntax problems belong in [`ParsedFile::parse_errors`]; an `Err` means the
/// file could not be handled at all and is treated as absent.
pub trait ConfigParser: Send + Sync {
    fn parse(&self, path: &str, text: &str) -> anyhow::Result<ParsedFile>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapContent(HashMap<Url, String>);

    #[async_trait]
    impl ContentResolver for MapContent {
        async fn resolve_one(&self, location: &Url) -> anyhow::Result<FileContent> {
            let text = self
                .0
                .get(location)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not found: {location}"))?;
            Ok(FileContent {
                location: location.clone(),
                text,
            })
        }
    }

    fn test_uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{}", name)).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order_and_isolates_failures() {
        let mut files = HashMap::new();
        files.insert(test_uri("a.json"), "{}".to_string());
        files.insert(test_uri("c.json"), "[]".to_string());
        let resolver = MapContent(files);

        let results = resolver
            .resolve_many(&[test_uri("a.json"), test_uri("b.json"), test_uri("c.json")])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().text, "{}");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().text, "[]");
    }
}
