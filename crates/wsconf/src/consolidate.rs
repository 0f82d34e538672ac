//
// consolidate.rs
//
// Fold the cached workspace files into one configuration tree
//

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::LoaderConfig;
use crate::merge::merge_into;
use crate::workspace::{ConsolidatedConfig, ParsedFile};

/// Resolved workspace files keyed by workspace-relative path, in insertion order
pub type FileMap = IndexMap<String, Arc<ParsedFile>>;

/// Merge every file in `files` into a single tree.
///
/// Files are folded in map order with last-write-wins per key at every
/// nesting level. Files whose stem is a standalone section (and which are not
/// the settings file) land under that key instead of at the root. Parse
/// errors are concatenated in file order. Absent files add their errors but
/// no content.
pub fn consolidate(files: &FileMap, config: &LoaderConfig) -> ConsolidatedConfig {
    let settings_path = config.settings_path();
    let mut contents = Value::Object(Map::new());
    let mut parse_errors = Vec::new();

    for (path, file) in files {
        parse_errors.extend(file.parse_errors.iter().cloned());

        if file.is_absent() {
            continue;
        }

        match standalone_section(path, &settings_path, config) {
            Some(section) => {
                let mut wrapped = Map::new();
                wrapped.insert(section.to_string(), file.tree.clone());
                merge_into(&mut contents, &Value::Object(wrapped));
            }
            None if file.tree.is_object() => merge_into(&mut contents, &file.tree),
            None => {
                log::warn!("Ignoring {}: top-level value is not an object", path);
            }
        }
    }

    ConsolidatedConfig {
        contents,
        parse_errors,
    }
}

fn standalone_section<'a>(
    path: &'a str,
    settings_path: &str,
    config: &LoaderConfig,
) -> Option<&'a str> {
    if path == settings_path {
        return None;
    }
    let file_name = path.rsplit('/').next()?;
    let (stem, _) = file_name.rsplit_once('.')?;
    config
        .standalone_sections
        .iter()
        .any(|s| s == stem)
        .then_some(stem)
}
