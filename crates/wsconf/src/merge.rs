//
// merge.rs
//
// Deep merge of configuration trees, section lookup and key flattening
//
// Merge semantics:
// - Objects: merged key by key, recursively
// - Arrays: replaced wholesale (overlay wins)
// - Scalars and mismatched kinds: overlay wins
//

use serde_json::{Map, Value};

/// Merge `source` into `target` in place. `source` is never modified.
pub fn merge_into(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && source_value.is_object() => {
                        merge_into(existing, source_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), source_value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Overlay workspace contents onto a clone of the global contents.
///
/// Keys present in both take the workspace value; keys present on one side
/// only are kept; nested objects are merged rather than replaced. Neither
/// input is mutated.
pub fn overlay(global_contents: &Value, consolidated_contents: &Value) -> Value {
    let mut merged = global_contents.clone();
    merge_into(&mut merged, consolidated_contents);
    merged
}

/// Look up a dotted section path (`editor.fontSize`).
///
/// An empty section returns the whole tree.
pub fn lookup<'a>(tree: &'a Value, section: &str) -> Option<&'a Value> {
    if section.is_empty() {
        return Some(tree);
    }
    section
        .split('.')
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

/// Dotted paths of every leaf in the tree, in tree order.
///
/// Empty objects and non-object values count as leaves.
pub fn flatten_keys(tree: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    if let Value::Object(map) = tree {
        collect_keys(map, "", &mut keys);
    }
    keys
}

fn collect_keys(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) if !child.is_empty() => collect_keys(child, &path, out),
            _ => out.push(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let merged = overlay(&json!({"timeout": 100}), &json!({"timeout": 200}));
        assert_eq!(merged["timeout"], 200);
    }

    #[test]
    fn test_round_trip_example() {
        let merged = overlay(&json!({"a": 1, "b": 2}), &json!({"b": 3, "c": 4}));
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_nested_objects_merge() {
        let globals = json!({"editor": {"fontSize": 12, "tabSize": 4}});
        let workspace = json!({"editor": {"tabSize": 2, "wordWrap": "on"}});
        let merged = overlay(&globals, &workspace);
        assert_eq!(
            merged,
            json!({"editor": {"fontSize": 12, "tabSize": 2, "wordWrap": "on"}})
        );
    }

    #[test]
    fn test_arrays_replace() {
        let merged = overlay(&json!({"list": [1, 2, 3]}), &json!({"list": [9]}));
        assert_eq!(merged["list"], json!([9]));
    }

    #[test]
    fn test_object_replaces_scalar_and_back() {
        let merged = overlay(&json!({"a": 1, "b": {"x": 1}}), &json!({"a": {"y": 2}, "b": 5}));
        assert_eq!(merged, json!({"a": {"y": 2}, "b": 5}));
    }

    #[test]
    fn test_null_overrides() {
        let merged = overlay(&json!({"a": 1}), &json!({"a": null}));
        assert!(merged["a"].is_null());
    }

    #[test]
    fn test_overlay_leaves_inputs_untouched() {
        let globals = json!({"a": {"b": 1}});
        let workspace = json!({"a": {"c": 2}});
        let before = globals.clone();
        let _ = overlay(&globals, &workspace);
        assert_eq!(globals, before);
        assert_eq!(workspace, json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_merge_preserves_key_order() {
        let merged = overlay(&json!({"z": 1, "a": 2}), &json!({"m": 3, "z": 4}));
        let keys: Vec<_> = merged.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_lookup() {
        let tree = json!({"editor": {"font": {"size": 12}}, "flat": true});
        assert_eq!(lookup(&tree, "editor.font.size"), Some(&json!(12)));
        assert_eq!(lookup(&tree, "editor.font"), Some(&json!({"size": 12})));
        assert_eq!(lookup(&tree, "flat"), Some(&json!(true)));
        assert_eq!(lookup(&tree, ""), Some(&tree));
        assert_eq!(lookup(&tree, "editor.missing"), None);
        assert_eq!(lookup(&tree, "flat.deeper"), None);
    }

    #[test]
    fn test_flatten_keys() {
        let tree = json!({"a": 1, "b": {"c": 2, "d": {"e": [1]}}, "empty": {}});
        assert_eq!(flatten_keys(&tree), vec!["a", "b.c", "b.d.e", "empty"]);
        assert!(flatten_keys(&json!(3)).is_empty());
    }

    fn arb_tree() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::from),
            (0i64..100).prop_map(Value::from),
            "[a-z]{0,4}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect()))
        })
    }

    fn arb_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-d]", arb_tree(), 0..5)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    proptest! {
        /// Every top-level workspace key that is not an object on both sides
        /// takes the workspace value verbatim.
        #[test]
        fn prop_override_law(globals in arb_object(), workspace in arb_object()) {
            let merged = overlay(&globals, &workspace);
            for (key, value) in workspace.as_object().unwrap() {
                let both_objects = value.is_object()
                    && globals.get(key).map_or(false, Value::is_object);
                if !both_objects {
                    prop_assert_eq!(&merged[key], value);
                }
            }
        }

        /// Keys only present in the defaults survive unchanged.
        #[test]
        fn prop_defaults_survive(globals in arb_object(), workspace in arb_object()) {
            let merged = overlay(&globals, &workspace);
            for (key, value) in globals.as_object().unwrap() {
                if workspace.get(key).is_none() {
                    prop_assert_eq!(&merged[key], value);
                }
            }
        }

        /// Overlaying never mutates the defaults, however many times it runs.
        #[test]
        fn prop_clone_law(globals in arb_object(), layers in prop::collection::vec(arb_object(), 1..4)) {
            let before = globals.clone();
            for layer in &layers {
                let _ = overlay(&globals, layer);
            }
            prop_assert_eq!(globals, before);
        }

        /// Overlaying a tree onto itself is a no-op.
        #[test]
        fn prop_self_overlay_is_identity(tree in arb_object()) {
            prop_assert_eq!(overlay(&tree, &tree), tree);
        }
    }
}
