//
// workspace/types.rs
//
// Data model shared by the cache, the consolidator and the loader
//

use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

/// Kind of a file change reported by a [`super::FileChangeSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeType {
    Added,
    Updated,
    Deleted,
}

/// One file change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub location: Url,
    pub change_type: FileChangeType,
}

impl FileChangeEvent {
    pub fn new(location: Url, change_type: FileChangeType) -> Self {
        Self {
            location,
            change_type,
        }
    }

    pub fn added(location: Url) -> Self {
        Self::new(location, FileChangeType::Added)
    }

    pub fn updated(location: Url) -> Self {
        Self::new(location, FileChangeType::Updated)
    }

    pub fn deleted(location: Url) -> Self {
        Self::new(location, FileChangeType::Deleted)
    }
}

/// Result of a stat call on a location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub location: Url,
    pub is_directory: bool,
    /// Direct children; `None` for files
    pub children: Option<Vec<Url>>,
}

/// Raw text fetched for a location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub location: Url,
    pub text: String,
}

/// A parsed workspace configuration file. Immutable; a re-parse produces a
/// new value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    /// Workspace-relative path, `/`-separated
    pub path: String,
    pub tree: Value,
    pub parse_errors: Vec<String>,
}

impl ParsedFile {
    pub fn new(path: impl Into<String>, tree: Value) -> Self {
        Self {
            path: path.into(),
            tree,
            parse_errors: Vec::new(),
        }
    }

    /// A file that could not be read or parsed: no content, one error
    pub fn with_error(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tree: Value::Null,
            parse_errors: vec![error.into()],
        }
    }

    /// Whether this file contributes no content
    pub fn is_absent(&self) -> bool {
        self.tree.is_null()
    }
}

/// All workspace files folded into one tree
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedConfig {
    pub contents: Value,
    pub parse_errors: Vec<String>,
}

impl Default for ConsolidatedConfig {
    fn default() -> Self {
        Self {
            contents: Value::Object(Map::new()),
            parse_errors: Vec::new(),
        }
    }
}

/// Process-wide default values. Treated as read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDefaults {
    pub contents: Value,
    pub parse_errors: Vec<String>,
}

impl GlobalDefaults {
    pub fn new(contents: Value) -> Self {
        Self {
            contents,
            parse_errors: Vec::new(),
        }
    }
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

/// The externally visible result of one load cycle
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSnapshot {
    pub merged: Value,
    pub consolidated: ConsolidatedConfig,
    pub globals: GlobalDefaults,
}

impl MergedSnapshot {
    /// Workspace parse errors followed by global parse errors
    pub fn parse_errors(&self) -> Vec<String> {
        self.consolidated
            .parse_errors
            .iter()
            .chain(self.globals.parse_errors.iter())
            .cloned()
            .collect()
    }
}

/// Published after every successful reload triggered by change events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationUpdate {
    pub config: Value,
}

/// Where a single key's value comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationInspect {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Flattened leaf keys of each configuration layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationKeys {
    pub default: Vec<String>,
    pub workspace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parsed_file_with_error_is_absent() {
        let file = ParsedFile::with_error(".vscode/settings.json", "bad");
        assert!(file.is_absent());
        assert!(!ParsedFile::new("a.json", json!({})).is_absent());
        assert_eq!(file.parse_errors, vec!["bad"]);
    }

    #[test]
    fn test_snapshot_parse_errors_order() {
        let snapshot = MergedSnapshot {
            merged: json!({}),
            consolidated: ConsolidatedConfig {
                contents: json!({}),
                parse_errors: vec!["workspace".to_string()],
            },
            globals: GlobalDefaults {
                contents: json!({}),
                parse_errors: vec!["global".to_string()],
            },
        };
        assert_eq!(snapshot.parse_errors(), vec!["workspace", "global"]);
    }

    #[test]
    fn test_inspect_serialization_skips_missing_layers() {
        let inspect = ConfigurationInspect {
            key: "a".to_string(),
            default: Some(json!(1)),
            workspace: None,
            value: Some(json!(1)),
        };
        assert_eq!(
            serde_json::to_value(&inspect).unwrap(),
            json!({"key": "a", "default": 1, "value": 1})
        );
    }
}
