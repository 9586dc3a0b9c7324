//! Dynamic configuration documents.
//!
//! Documents are JSON-compatible trees (`serde_json::Value`). Field paths use dot
//! notation (`tls.cert`) to walk nested mappings; array elements are addressed
//! as `items[2]` in diff output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::{Result, SatinError};

/// A nested key/value document with no fixed shape.
pub type ConfigDocument = Map<String, Value>;

/// Runtime variant of a document value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join a parent path and a mapping key.
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Join a parent path and an array index.
pub fn index_path(prefix: &str, index: usize) -> String {
    format!("{}[{}]", prefix, index)
}

/// Look up a dot-separated path inside a document.
pub fn get_path<'a>(document: &'a ConfigDocument, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set a value at a dot-separated path, creating intermediate mappings.
///
/// Fails when an intermediate segment already holds a non-mapping value.
pub fn set_path(document: &mut ConfigDocument, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| SatinError::Serialization("empty field path".to_string()))?;

    let mut current = document;
    for (depth, segment) in parents.iter().enumerate() {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            SatinError::Serialization(format!(
                "cannot set '{}': '{}' is not a mapping",
                path,
                segments[..=depth].join(".")
            ))
        })?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Interpret a parsed value as a document; the root must be a mapping.
pub fn into_document(value: Value) -> Result<ConfigDocument> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SatinError::Serialization(format!(
            "document root must be a mapping, found {}",
            ValueKind::of(&other)
        ))),
    }
}

/// Parse a document from text. YAML is accepted for `.yaml`/`.yml` hints,
/// everything else is parsed as JSON.
pub fn parse_document(content: &str, format_hint: Option<&str>) -> Result<ConfigDocument> {
    let value: Value = match format_hint {
        Some("yaml") | Some("yml") => serde_yaml_ng::from_str(content)?,
        _ => serde_json::from_str(content)?,
    };
    into_document(value)
}

/// Read a document file, choosing the parser from the file extension.
pub fn read_document(path: &Path) -> Result<ConfigDocument> {
    let content = std::fs::read_to_string(path)?;
    let hint = path.extension().and_then(|ext| ext.to_str());
    parse_document(&content, hint).map_err(|e| match e {
        SatinError::Serialization(msg) => {
            SatinError::Serialization(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}
