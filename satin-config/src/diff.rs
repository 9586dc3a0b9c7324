//! Structural diff between documents and presets.

use satin_core::document::{index_path, join_path};
use satin_core::{ConfigDocument, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::preset::Preset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Changed,
}

/// One difference at a leaf path.
///
/// `old` is absent for additions and `new` for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub kind: DiffKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

impl DiffEntry {
    fn added(path: String, new: Value) -> Self {
        Self {
            path,
            kind: DiffKind::Added,
            old: None,
            new: Some(new),
        }
    }

    fn removed(path: String, old: Value) -> Self {
        Self {
            path,
            kind: DiffKind::Removed,
            old: Some(old),
            new: None,
        }
    }

    fn changed(path: String, old: Value, new: Value) -> Self {
        Self {
            path,
            kind: DiffKind::Changed,
            old: Some(old),
            new: Some(new),
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map(Value::to_string).unwrap_or_default();
        match self.kind {
            DiffKind::Added => write!(f, "+ {}: {}", self.path, show(&self.new)),
            DiffKind::Removed => write!(f, "- {}: {}", self.path, show(&self.old)),
            DiffKind::Changed => write!(
                f,
                "~ {}: {} -> {}",
                self.path,
                show(&self.old),
                show(&self.new)
            ),
        }
    }
}

/// Counts per diff kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

impl DiffSummary {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.changed
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} changed",
            self.added, self.removed, self.changed
        )
    }
}

pub fn summarize(entries: &[DiffEntry]) -> DiffSummary {
    entries
        .iter()
        .fold(DiffSummary::default(), |mut summary, entry| {
            match entry.kind {
                DiffKind::Added => summary.added += 1,
                DiffKind::Removed => summary.removed += 1,
                DiffKind::Changed => summary.changed += 1,
            }
            summary
        })
}

/// Differences between the parameters of two presets.
pub fn diff(a: &Preset, b: &Preset) -> Vec<DiffEntry> {
    diff_documents(&a.parameters, &b.parameters)
}

/// Differences from `a` to `b`, keys visited in sorted order.
pub fn diff_documents(a: &ConfigDocument, b: &ConfigDocument) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    diff_maps(a, b, "", &mut entries);
    entries
}

fn diff_maps(a: &ConfigDocument, b: &ConfigDocument, prefix: &str, out: &mut Vec<DiffEntry>) {
    let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let path = join_path(prefix, key);
        match (a.get(key.as_str()), b.get(key.as_str())) {
            (Some(old), Some(new)) => diff_values(old, new, path, out),
            (Some(old), None) => flatten(old, path, out, &DiffEntry::removed),
            (None, Some(new)) => flatten(new, path, out, &DiffEntry::added),
            (None, None) => {}
        }
    }
}

fn diff_values(old: &Value, new: &Value, path: String, out: &mut Vec<DiffEntry>) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_maps(a, b, &path, out),
        (Value::Array(a), Value::Array(b)) => {
            for index in 0..a.len().max(b.len()) {
                let item_path = index_path(&path, index);
                match (a.get(index), b.get(index)) {
                    (Some(x), Some(y)) => diff_values(x, y, item_path, out),
                    (Some(x), None) => flatten(x, item_path, out, &DiffEntry::removed),
                    (None, Some(y)) => flatten(y, item_path, out, &DiffEntry::added),
                    (None, None) => {}
                }
            }
        }
        _ if ValueKind::of(old) != ValueKind::of(new) || !is_container(old) => {
            out.push(DiffEntry::changed(path, old.clone(), new.clone()));
        }
        _ => {}
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Emit one entry per leaf of a one-sided subtree. Empty containers are leaves.
fn flatten(
    value: &Value,
    path: String,
    out: &mut Vec<DiffEntry>,
    make: &dyn Fn(String, Value) -> DiffEntry,
) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                flatten(&map[key.as_str()], join_path(&path, key), out, make);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, item) in items.iter().enumerate() {
                flatten(item, index_path(&path, index), out, make);
            }
        }
        leaf => out.push(make(path, leaf.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ConfigDocument {
        satin_core::document::into_document(value).expect("test document must be a mapping")
    }

    fn rendered(entries: &[DiffEntry]) -> Vec<String> {
        entries.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_identical_documents_have_no_diff() {
        let a = doc(json!({"a": 1, "b": {"c": [1, 2, {"d": null}]}}));
        assert!(diff_documents(&a, &a).is_empty());
    }

    #[test]
    fn test_nested_objects_recurse() {
        let a = doc(json!({"render": {"samples": 64, "denoise": true}}));
        let b = doc(json!({"render": {"samples": 128, "engine": "cycles"}}));
        assert_eq!(
            rendered(&diff_documents(&a, &b)),
            vec![
                "- render.denoise: true",
                "+ render.engine: \"cycles\"",
                "~ render.samples: 64 -> 128",
            ]
        );
    }

    #[test]
    fn test_arrays_compare_by_index() {
        let a = doc(json!({"items": [1, 2, 3]}));
        let b = doc(json!({"items": [1, 5]}));
        assert_eq!(
            rendered(&diff_documents(&a, &b)),
            vec!["~ items[1]: 2 -> 5", "- items[2]: 3"]
        );

        let c = doc(json!({"items": [1, 5, {"x": 1}]}));
        assert_eq!(
            rendered(&diff_documents(&b, &c)),
            vec!["+ items[2].x: 1"]
        );
    }

    #[test]
    fn test_one_sided_subtrees_flatten_to_leaves() {
        let a = doc(json!({}));
        let b = doc(json!({"lights": {"key": {"on": true}, "fill": {}}, "tags": []}));
        assert_eq!(
            rendered(&diff_documents(&a, &b)),
            vec![
                "+ lights.fill: {}",
                "+ lights.key.on: true",
                "+ tags: []",
            ]
        );
    }

    #[test]
    fn test_kind_change_is_single_entry() {
        let a = doc(json!({"camera": {"fov": 50}, "tags": ["a"]}));
        let b = doc(json!({"camera": 50, "tags": {"0": "a"}}));
        let entries = diff_documents(&a, &b);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.kind == DiffKind::Changed));
        assert_eq!(entries[0].path, "camera");
        assert_eq!(entries[0].old, Some(json!({"fov": 50})));
        assert_eq!(entries[1].path, "tags");
    }

    #[test]
    fn test_summarize() {
        let a = doc(json!({"x": 1, "y": 2, "w": 0}));
        let b = doc(json!({"x": 1, "y": 3, "z": 5}));
        let summary = summarize(&diff_documents(&a, &b));
        assert_eq!(
            summary,
            DiffSummary {
                added: 1,
                removed: 1,
                changed: 1
            }
        );
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.to_string(), "1 added, 1 removed, 1 changed");
    }
}
