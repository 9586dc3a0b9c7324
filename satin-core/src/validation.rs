//! Validation result types shared by the validator, the preset store and the
//! plugin registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a single validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    MissingField,
    TypeMismatch,
    ConstraintViolation,
    DependencyViolation,
    UnknownField,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValidationErrorKind::MissingField => "MissingField",
            ValidationErrorKind::TypeMismatch => "TypeMismatch",
            ValidationErrorKind::ConstraintViolation => "ConstraintViolation",
            ValidationErrorKind::DependencyViolation => "DependencyViolation",
            ValidationErrorKind::UnknownField => "UnknownField",
        };
        f.write_str(name)
    }
}

/// One problem found in a document, located by its field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        path: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.kind, self.message)
    }
}

/// Outcome of validating a document against a schema.
///
/// `valid` is derived from `errors` at construction, so the two can never
/// disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ValidationReport")]
pub struct ValidationResult {
    valid: bool,
    errors: Vec<ValidationIssue>,
}

#[derive(Deserialize)]
struct ValidationReport {
    errors: Vec<ValidationIssue>,
}

impl From<ValidationReport> for ValidationResult {
    fn from(report: ValidationReport) -> Self {
        Self::from_issues(report.errors)
    }
}

impl ValidationResult {
    /// A result with no issues.
    pub fn ok() -> Self {
        Self::from_issues(Vec::new())
    }

    pub fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[ValidationIssue] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ValidationIssue> {
        self.errors
    }

    /// Issues of one kind, in reporting order.
    pub fn errors_of(&self, kind: ValidationErrorKind) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(move |issue| issue.kind == kind)
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.valid {
            return writeln!(f, "✅ valid");
        }
        for issue in &self.errors {
            writeln!(f, "❌ {}", issue)?;
        }
        Ok(())
    }
}
