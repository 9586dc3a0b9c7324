//! Document validation against a [`Schema`].
//!
//! Validation never fails: every problem becomes a [`ValidationIssue`] in the
//! returned [`ValidationResult`]. Checks run in a fixed order (required fields,
//! types, constraints, dependencies and relationships, then unknown fields in
//! strict mode) so the same input always yields the same report.

use std::cmp::Ordering;
use std::sync::Arc;

use satin_core::document::{join_path, set_path};
use satin_core::{
    get_path, ConfigDocument, Result, ValidationErrorKind, ValidationIssue, ValidationResult,
    ValueKind,
};
use satin_logging::Logger;
use serde_json::Value;

use crate::preset::Preset;
use crate::schema::{DependencyEffect, FieldSpec, RelationOp, Relationship, Schema, SchemaRegistry};

/// Knobs that change what the validator reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorOptions {
    /// Report document paths the schema does not declare.
    pub strict: bool,
}

pub struct Validator {
    options: ValidatorOptions,
    logger: Arc<dyn Logger>,
}

impl Validator {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self::with_options(ValidatorOptions::default(), logger)
    }

    pub fn with_options(options: ValidatorOptions, logger: Arc<dyn Logger>) -> Self {
        Self { options, logger }
    }

    pub fn options(&self) -> ValidatorOptions {
        self.options
    }

    /// Validate `document` against `schema`.
    pub fn validate(&self, schema: &Schema, document: &ConfigDocument) -> ValidationResult {
        let mut issues = Vec::new();

        check_required(schema, document, &mut issues);
        let typed = check_types(schema, document, &mut issues);
        for (field, value) in typed {
            check_constraints(schema, field, value, &mut issues);
        }
        check_dependencies(schema, document, &mut issues);
        for relationship in schema.relationships() {
            check_relationship(relationship, document, &mut issues);
        }
        if self.options.strict {
            check_unknown(schema, document, "", &mut issues);
        }

        self.logger.debug(&format!(
            "Validated document against schema '{}': {} issue(s)",
            schema.name(),
            issues.len()
        ));
        ValidationResult::from_issues(issues)
    }

    /// Validate against a schema looked up by name.
    pub fn validate_named(
        &self,
        registry: &SchemaRegistry,
        schema_name: &str,
        document: &ConfigDocument,
    ) -> Result<ValidationResult> {
        let schema = registry.get(schema_name)?;
        Ok(self.validate(&schema, document))
    }

    /// Validate many presets, returning only the ones that fail.
    pub fn validate_batch<'a, I>(&self, schema: &Schema, presets: I) -> Vec<(String, ValidationResult)>
    where
        I: IntoIterator<Item = &'a Preset>,
    {
        let mut checked = 0usize;
        let failures: Vec<_> = presets
            .into_iter()
            .inspect(|_| checked += 1)
            .filter_map(|preset| {
                let result = self.validate(schema, &preset.parameters);
                (!result.is_valid()).then(|| (preset.name.clone(), result))
            })
            .collect();

        self.logger.info(&format!(
            "Batch validation against '{}': {} of {} preset(s) invalid",
            schema.name(),
            failures.len(),
            checked
        ));
        failures
    }

    /// Copy of `document` with every absent defaulted field filled in.
    pub fn apply_defaults(&self, schema: &Schema, document: &ConfigDocument) -> ConfigDocument {
        let mut filled = document.clone();
        for field in schema.fields() {
            let Some(default) = &field.default else {
                continue;
            };
            if get_path(&filled, &field.path).is_some() {
                continue;
            }
            if let Err(e) = set_path(&mut filled, &field.path, default.clone()) {
                self.logger
                    .warn(&format!("Skipping default for '{}': {}", field.path, e));
            }
        }
        filled
    }
}

fn issue(
    issues: &mut Vec<ValidationIssue>,
    path: &str,
    kind: ValidationErrorKind,
    message: String,
) {
    issues.push(ValidationIssue::new(path, kind, message));
}

fn check_required(schema: &Schema, document: &ConfigDocument, issues: &mut Vec<ValidationIssue>) {
    for field in schema.fields().iter().filter(|f| f.required) {
        if get_path(document, &field.path).is_none() {
            issue(
                issues,
                &field.path,
                ValidationErrorKind::MissingField,
                "required field is missing".to_string(),
            );
        }
    }
}

/// Type-check every present field; returns the ones that passed.
fn check_types<'s, 'd>(
    schema: &'s Schema,
    document: &'d ConfigDocument,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<(&'s FieldSpec, &'d Value)> {
    let mut passed = Vec::new();
    for field in schema.fields() {
        let Some(value) = get_path(document, &field.path) else {
            continue;
        };
        let kind = ValueKind::of(value);
        if field.field_type.accepts(kind) {
            passed.push((field, value));
        } else {
            issue(
                issues,
                &field.path,
                ValidationErrorKind::TypeMismatch,
                format!("expected {}, found {}", field.field_type.as_str(), kind),
            );
        }
    }
    passed
}

fn check_constraints(
    schema: &Schema,
    field: &FieldSpec,
    value: &Value,
    issues: &mut Vec<ValidationIssue>,
) {
    let c = &field.constraints;
    let path = field.path.as_str();
    let violation = ValidationErrorKind::ConstraintViolation;

    if let Some(n) = value.as_f64() {
        if let Some(min) = c.min.filter(|min| n < *min) {
            issue(issues, path, violation, format!("{} is less than minimum {}", value, min));
        }
        if let Some(max) = c.max.filter(|max| n > *max) {
            issue(issues, path, violation, format!("{} is greater than maximum {}", value, max));
        }
    }

    let length = match value {
        Value::String(s) => Some((s.chars().count(), "characters")),
        Value::Array(items) => Some((items.len(), "items")),
        _ => None,
    };
    if let Some((len, unit)) = length {
        if let Some(min) = c.min_length.filter(|min| len < *min) {
            issue(
                issues,
                path,
                violation,
                format!("length {} is shorter than minimum {} {}", len, min, unit),
            );
        }
        if let Some(max) = c.max_length.filter(|max| len > *max) {
            issue(
                issues,
                path,
                violation,
                format!("length {} is longer than maximum {} {}", len, max, unit),
            );
        }
    }

    if let (Value::String(s), Some(regex)) = (value, schema.pattern(path)) {
        if !regex.is_match(s) {
            issue(
                issues,
                path,
                violation,
                format!("'{}' does not match pattern '{}'", s, regex.as_str()),
            );
        }
    }

    if let Some(allowed) = &c.enum_values {
        if !allowed.iter().any(|candidate| values_equal(candidate, value)) {
            let choices: Vec<String> = allowed.iter().map(Value::to_string).collect();
            issue(
                issues,
                path,
                violation,
                format!("{} is not one of [{}]", value, choices.join(", ")),
            );
        }
    }
}

fn check_dependencies(
    schema: &Schema,
    document: &ConfigDocument,
    issues: &mut Vec<ValidationIssue>,
) {
    for field in schema.fields() {
        let present = get_path(document, &field.path).is_some();
        for rule in &field.dependencies {
            let triggered = get_path(document, &rule.when)
                .is_some_and(|actual| values_equal(actual, &rule.equals));
            if !triggered {
                continue;
            }
            match rule.effect {
                DependencyEffect::Required if !present => issue(
                    issues,
                    &field.path,
                    ValidationErrorKind::DependencyViolation,
                    format!("required when '{}' is {}", rule.when, rule.equals),
                ),
                DependencyEffect::Forbidden if present => issue(
                    issues,
                    &field.path,
                    ValidationErrorKind::DependencyViolation,
                    format!("not allowed when '{}' is {}", rule.when, rule.equals),
                ),
                _ => {}
            }
        }
    }
}

fn check_relationship(
    relationship: &Relationship,
    document: &ConfigDocument,
    issues: &mut Vec<ValidationIssue>,
) {
    let (Some(left), Some(right)) = (
        get_path(document, &relationship.left),
        get_path(document, &relationship.right),
    ) else {
        return;
    };

    let holds = match relationship.op {
        RelationOp::Equals => Some(values_equal(left, right)),
        RelationOp::NotEquals => Some(!values_equal(left, right)),
        RelationOp::GreaterThan => compare(left, right).map(|o| o == Ordering::Greater),
        RelationOp::LessThan => compare(left, right).map(|o| o == Ordering::Less),
    };

    let message = match holds {
        Some(true) => return,
        Some(false) => format!(
            "expected '{}' {} '{}' ({} vs {})",
            relationship.left,
            relationship.op.symbol(),
            relationship.right,
            left,
            right
        ),
        None => format!(
            "cannot compare '{}' ({}) with '{}' ({})",
            relationship.left,
            ValueKind::of(left),
            relationship.right,
            ValueKind::of(right)
        ),
    };
    issue(
        issues,
        &relationship.left,
        ValidationErrorKind::DependencyViolation,
        message,
    );
}

fn check_unknown(
    schema: &Schema,
    value: &ConfigDocument,
    prefix: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut keys: Vec<&String> = value.keys().collect();
    keys.sort();
    for key in keys {
        let path = join_path(prefix, key);
        let declared = schema.field(&path).is_some();
        let has_descendants = schema.has_descendants(&path);

        if !declared && !has_descendants {
            issue(
                issues,
                &path,
                ValidationErrorKind::UnknownField,
                "field is not declared in the schema".to_string(),
            );
            continue;
        }
        if has_descendants {
            if let Some(Value::Object(child)) = value.get(key.as_str()) {
                check_unknown(schema, child, &path, issues);
            }
        }
    }
}

/// Equality that treats `1` and `1.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
