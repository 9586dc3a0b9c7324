//! Schemas and the schema registry
//!
//! A schema is a named, ordered list of field specifications plus cross-field
//! relationship rules. Schemas are immutable once built: the registry hands out
//! `Arc<Schema>` and changing one means unregistering and registering again.

use regex::Regex;
use satin_core::{Result, SatinError, ValueKind};
use satin_logging::Logger;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::instrument;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Enum,
}

impl FieldType {
    /// Whether a value of `kind` has the right shape for this type.
    ///
    /// `Enum` accepts any scalar; membership is a constraint, checked later.
    pub fn accepts(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (FieldType::String, ValueKind::String)
                | (FieldType::Number, ValueKind::Number)
                | (FieldType::Boolean, ValueKind::Boolean)
                | (FieldType::Array, ValueKind::Array)
                | (FieldType::Object, ValueKind::Object)
                | (
                    FieldType::Enum,
                    ValueKind::String | ValueKind::Number | ValueKind::Boolean
                )
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Enum => "enum",
        }
    }
}

/// Value constraints applied after a field passes its type check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Inclusive lower bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Inclusive upper bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Minimum string length (chars) or array length (items)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Maximum string length (chars) or array length (items)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Regular expression a string must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self == &Constraints::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyEffect {
    Required,
    Forbidden,
}

/// "This field is required/forbidden when `when` equals `equals`."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub when: String,
    pub equals: Value,
    pub effect: DependencyEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
}

impl RelationOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RelationOp::Equals => "==",
            RelationOp::NotEquals => "!=",
            RelationOp::GreaterThan => ">",
            RelationOp::LessThan => "<",
        }
    }
}

/// Cross-field comparison: `left op right`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub left: String,
    pub op: RelationOp,
    pub right: String,
}

/// Specification of one field, addressed by a dot-separated path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyRule>,
}

impl FieldSpec {
    pub fn new(path: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            path: path.into(),
            field_type,
            required: false,
            default: None,
            constraints: Constraints::default(),
            dependencies: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.constraints.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.constraints.max = Some(max);
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.constraints.min_length = min;
        self.constraints.max_length = max;
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.constraints.pattern = Some(pattern.into());
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.constraints.enum_values = Some(values);
        self
    }

    pub fn required_when(mut self, field: impl Into<String>, equals: Value) -> Self {
        self.dependencies.push(DependencyRule {
            when: field.into(),
            equals,
            effect: DependencyEffect::Required,
        });
        self
    }

    pub fn forbidden_when(mut self, field: impl Into<String>, equals: Value) -> Self {
        self.dependencies.push(DependencyRule {
            when: field.into(),
            equals,
            effect: DependencyEffect::Forbidden,
        });
        self
    }
}

/// Serialized form of a schema (YAML or JSON file contents)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

/// A checked, immutable schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDefinition", into = "SchemaDefinition")]
pub struct Schema {
    name: String,
    description: Option<String>,
    fields: Vec<FieldSpec>,
    relationships: Vec<Relationship>,
    patterns: HashMap<String, Regex>,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        Self::from_definition(SchemaDefinition {
            name: name.into(),
            description: None,
            fields,
            relationships: Vec::new(),
        })
    }

    /// Build a schema, enforcing its structural invariants.
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self> {
        let SchemaDefinition {
            name,
            description,
            fields,
            relationships,
        } = definition;

        let invalid = |reason: String| SatinError::InvalidSchema {
            name: name.clone(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(invalid("schema name cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        let mut patterns = HashMap::new();
        for field in &fields {
            if field.path.is_empty() || field.path.split('.').any(str::is_empty) {
                return Err(invalid(format!("invalid field path '{}'", field.path)));
            }
            if !seen.insert(field.path.as_str()) {
                return Err(invalid(format!("duplicate field path '{}'", field.path)));
            }

            let constraints = &field.constraints;
            if let (Some(min), Some(max)) = (constraints.min, constraints.max) {
                if min > max {
                    return Err(invalid(format!(
                        "field '{}' has min {} greater than max {}",
                        field.path, min, max
                    )));
                }
            }
            if let (Some(min), Some(max)) = (constraints.min_length, constraints.max_length) {
                if min > max {
                    return Err(invalid(format!(
                        "field '{}' has min_length {} greater than max_length {}",
                        field.path, min, max
                    )));
                }
            }
            if field.field_type == FieldType::Enum
                && constraints.enum_values.as_ref().map_or(true, Vec::is_empty)
            {
                return Err(invalid(format!(
                    "enum field '{}' must list its allowed values",
                    field.path
                )));
            }
            if let Some(pattern) = &constraints.pattern {
                let regex = Regex::new(pattern).map_err(|e| {
                    invalid(format!("field '{}' has invalid pattern: {}", field.path, e))
                })?;
                patterns.insert(field.path.clone(), regex);
            }
            if let Some(rule) = field.dependencies.iter().find(|r| r.when.is_empty()) {
                return Err(invalid(format!(
                    "field '{}' has a dependency rule without a 'when' field ({:?})",
                    field.path, rule.effect
                )));
            }
        }

        if let Some(rel) = relationships
            .iter()
            .find(|r| r.left.is_empty() || r.right.is_empty())
        {
            return Err(invalid(format!(
                "relationship '{} {} {}' needs both sides",
                rel.left,
                rel.op.symbol(),
                rel.right
            )));
        }

        Ok(Self {
            name,
            description,
            fields,
            relationships,
            patterns,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a schema file; `.json` files are JSON, everything else YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        };
        parsed.map_err(|e| match e {
            SatinError::Serialization(msg) => {
                SatinError::Serialization(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn field(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Compiled pattern for a field, if it declares one.
    pub fn pattern(&self, path: &str) -> Option<&Regex> {
        self.patterns.get(path)
    }

    /// True if some declared field lives strictly below `path`.
    pub fn has_descendants(&self, path: &str) -> bool {
        self.fields.iter().any(|f| {
            f.path.len() > path.len()
                && f.path.starts_with(path)
                && f.path.as_bytes()[path.len()] == b'.'
        })
    }
}

impl TryFrom<SchemaDefinition> for Schema {
    type Error = SatinError;

    fn try_from(definition: SchemaDefinition) -> Result<Self> {
        Schema::from_definition(definition)
    }
}

impl From<Schema> for SchemaDefinition {
    fn from(schema: Schema) -> Self {
        SchemaDefinition {
            name: schema.name,
            description: schema.description,
            fields: schema.fields,
            relationships: schema.relationships,
        }
    }
}

/// Holds every registered schema by name
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
    logger: Arc<dyn Logger>,
}

impl SchemaRegistry {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            logger,
        }
    }

    /// Register a schema; the name must not be taken.
    #[instrument(skip(self, schema), fields(name = %schema.name()))]
    pub fn register(&self, schema: Schema) -> Result<Arc<Schema>> {
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        if schemas.contains_key(schema.name()) {
            self.logger
                .warn(&format!("Schema '{}' is already registered", schema.name()));
            return Err(SatinError::DuplicateSchema {
                name: schema.name().to_string(),
            });
        }

        let schema = Arc::new(schema);
        schemas.insert(schema.name().to_string(), Arc::clone(&schema));
        self.logger.info(&format!(
            "Registered schema '{}' ({} fields)",
            schema.name(),
            schema.fields().len()
        ));
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Schema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| SatinError::SchemaNotFound {
                name: name.to_string(),
            })
    }

    /// Remove a schema. Validators already holding it keep their copy.
    pub fn unregister(&self, name: &str) -> Result<Arc<Schema>> {
        let removed = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| SatinError::SchemaNotFound {
                name: name.to_string(),
            })?;
        self.logger.info(&format!("Unregistered schema '{}'", name));
        Ok(removed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered schema names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Register every schema file (`.yaml`, `.yml`, `.json`) in `dir`, in file
    /// name order. Returns the registered names.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut files: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("yaml" | "yml" | "json")
                    )
            })
            .collect();
        files.sort();

        let mut loaded = Vec::with_capacity(files.len());
        for path in files {
            let schema = Schema::from_file(&path)?;
            let registered = self.register(schema)?;
            loaded.push(registered.name().to_string());
        }
        self.logger.debug(&format!(
            "Loaded {} schema(s) from {}",
            loaded.len(),
            dir.display()
        ));
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satin_logging::MemoryLogger;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(Arc::new(MemoryLogger::new()))
    }

    #[test]
    fn test_deserialize_schema_yaml() {
        let yaml = r#"
name: server
description: HTTP server settings
fields:
  - path: port
    type: number
    required: true
    constraints:
      min: 1
      max: 65535
  - path: mode
    type: enum
    constraints:
      enum: [dev, prod]
  - path: tls.cert
    type: string
    dependencies:
      - when: tls.enabled
        equals: true
        effect: required
relationships:
  - left: limits.max
    op: greater_than
    right: limits.min
"#;
        let schema = Schema::from_yaml_str(yaml).expect("should deserialize schema");
        assert_eq!(schema.name(), "server");
        assert_eq!(schema.fields().len(), 3);
        assert!(schema.field("port").is_some_and(|f| f.required));
        assert_eq!(schema.field("tls.cert").map(|f| f.dependencies.len()), Some(1));
        assert_eq!(schema.relationships()[0].op, RelationOp::GreaterThan);
    }

    #[test]
    fn test_duplicate_field_paths_rejected() {
        let err = Schema::new(
            "dup",
            vec![
                FieldSpec::new("port", FieldType::Number),
                FieldSpec::new("port", FieldType::String),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SatinError::InvalidSchema { .. }));
        assert!(err.to_string().contains("duplicate field path 'port'"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Schema::new("bad", vec![FieldSpec::new("name", FieldType::String).pattern("([")])
            .unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_enum_without_values_rejected() {
        let err = Schema::new("bad", vec![FieldSpec::new("mode", FieldType::Enum)]).unwrap_err();
        assert!(err.to_string().contains("must list its allowed values"));
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let err = Schema::new("bad", vec![FieldSpec::new("n", FieldType::Number).min(5.0).max(1.0)])
            .unwrap_err();
        assert!(err.to_string().contains("greater than max"));
    }

    #[test]
    fn test_has_descendants() -> Result<()> {
        let schema = Schema::new(
            "nested",
            vec![
                FieldSpec::new("tls", FieldType::Object),
                FieldSpec::new("tls.cert", FieldType::String),
                FieldSpec::new("tlsx", FieldType::String),
            ],
        )?;
        assert!(schema.has_descendants("tls"));
        assert!(!schema.has_descendants("tls.cert"));
        assert!(!schema.has_descendants("tlsx"));
        Ok(())
    }

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::Number.accepts(ValueKind::Number));
        assert!(!FieldType::Number.accepts(ValueKind::String));
        assert!(FieldType::Enum.accepts(ValueKind::String));
        assert!(!FieldType::Enum.accepts(ValueKind::Array));
        assert!(!FieldType::String.accepts(ValueKind::Null));
    }

    #[test]
    fn test_schema_round_trips_through_definition() -> Result<()> {
        let schema = Schema::new(
            "roundtrip",
            vec![FieldSpec::new("mode", FieldType::Enum).one_of(vec![json!("a"), json!("b")])],
        )?;
        let yaml = serde_yaml_ng::to_string(&schema)?;
        let back = Schema::from_yaml_str(&yaml)?;
        assert_eq!(back.fields(), schema.fields());
        Ok(())
    }

    #[test]
    fn test_register_and_get() -> Result<()> {
        let registry = registry();
        registry.register(Schema::new("a", vec![])?)?;
        assert!(registry.contains("a"));
        assert_eq!(registry.get("a")?.name(), "a");
        assert!(matches!(
            registry.get("missing"),
            Err(SatinError::SchemaNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_register_duplicate_fails_and_keeps_original() -> Result<()> {
        let registry = registry();
        registry.register(Schema::new(
            "a",
            vec![FieldSpec::new("x", FieldType::Number)],
        )?)?;
        let err = registry.register(Schema::new("a", vec![])?).unwrap_err();
        assert!(matches!(err, SatinError::DuplicateSchema { ref name } if name == "a"));
        assert_eq!(registry.get("a")?.fields().len(), 1);
        Ok(())
    }

    #[test]
    fn test_unregister_then_reregister() -> Result<()> {
        let registry = registry();
        let first = registry.register(Schema::new("a", vec![])?)?;
        registry.unregister("a")?;
        registry.register(Schema::new(
            "a",
            vec![FieldSpec::new("x", FieldType::Number)],
        )?)?;
        // Holders of the old Arc still see the old definition.
        assert!(first.fields().is_empty());
        assert_eq!(registry.get("a")?.fields().len(), 1);
        assert!(registry.unregister("nope").is_err());
        Ok(())
    }

    #[test]
    fn test_concurrent_same_name_register_has_one_winner() -> Result<()> {
        let registry = registry();
        let wins: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        Schema::new("shared", vec![])
                            .and_then(|schema| registry.register(schema))
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread panicked") as usize)
                .sum()
        });
        assert_eq!(wins, 1);
        assert_eq!(registry.names(), vec!["shared".to_string()]);
        Ok(())
    }
}
