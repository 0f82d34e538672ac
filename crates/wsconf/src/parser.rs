//
// parser.rs
//
// JSON-with-comments parser for workspace configuration files
//

use serde_json::{Map, Value};

use crate::merge::merge_into;
use crate::workspace::{ConfigParser, ParsedFile};

/// Parses settings files written in JSON with `//` and `/* */` comments and
/// trailing commas.
///
/// Syntax errors never fail the parse: they produce a [`ParsedFile`] with no
/// content and a single `Unable to parse <path>: <reason>` error.
#[derive(Debug, Clone)]
pub struct JsonConfigParser {
    /// Expand top-level dotted keys (`"editor.fontSize": 12`) into nested objects
    pub expand_dotted_keys: bool,
}

impl Default for JsonConfigParser {
    fn default() -> Self {
        Self {
            expand_dotted_keys: true,
        }
    }
}

impl JsonConfigParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_tree(&self, text: &str) -> Result<Value, String> {
        let clean = strip_json_comments(text);
        if clean.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        match serde_json::from_str::<Value>(&clean) {
            Ok(Value::Object(map)) if self.expand_dotted_keys => Ok(expand_dotted_keys(map)),
            Ok(tree @ Value::Object(_)) => Ok(tree),
            Ok(_) => Err("expected an object at the top level".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

impl ConfigParser for JsonConfigParser {
    fn parse(&self, path: &str, text: &str) -> anyhow::Result<ParsedFile> {
        match self.parse_tree(text) {
            Ok(tree) => Ok(ParsedFile::new(path, tree)),
            Err(reason) => {
                log::error!("Unexpected error: Unable to parse {}: {}", path, reason);
                Ok(ParsedFile::with_error(
                    path,
                    format!("Unable to parse {}: {}", path, reason),
                ))
            }
        }
    }
}

/// Remove comments and trailing commas outside of string literals.
///
/// Comments are replaced by whitespace with their newlines kept so that
/// error positions still point at the original line.
pub fn strip_json_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match (c, chars.get(i + 1)) {
            ('"', _) => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                // skip the closing `*/` (or run off the end of an unterminated comment)
                i = (i + 2).min(chars.len());
                out.push(' ');
            }
            (',', _) if closes_after_comma(&chars, i + 1) => {
                out.push(' ');
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Whether the next significant character after `start` closes an object or
/// array, skipping whitespace and comments.
fn closes_after_comma(chars: &[char], start: usize) -> bool {
    let mut i = start;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1)) {
            (c, _) if c.is_whitespace() => i += 1,
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            (c, _) => return c == '}' || c == ']',
        }
    }
    false
}

/// Turn top-level dotted keys into nested objects.
///
/// A key whose path runs through a non-object value is dropped with a warning.
pub fn expand_dotted_keys(map: Map<String, Value>) -> Value {
    let mut root = Map::new();
    for (key, value) in map {
        if !key.contains('.') {
            insert_or_merge(&mut root, key, value);
            continue;
        }

        let segments: Vec<&str> = key.split('.').collect();
        if !insert_path(&mut root, &segments, value) {
            log::warn!("Ignoring {}: a parent segment is not an object", key);
        }
    }
    Value::Object(root)
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) -> bool {
    match segments {
        [] => false,
        [last] => {
            insert_or_merge(map, last.to_string(), value);
            true
        }
        [first, rest @ ..] => {
            let child = map
                .entry(first.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match child {
                Value::Object(child_map) => insert_path(child_map, rest, value),
                _ => false,
            }
        }
    }
}

fn insert_or_merge(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(existing) if existing.is_object() && value.is_object() => {
            merge_into(existing, &value);
        }
        _ => {
            map.insert(key, value);
        }
    }
}
