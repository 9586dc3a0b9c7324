//! Shared foundation for the Satin configuration core.
//!
//! Provides the error taxonomy used by every crate in the workspace, the dynamic
//! document model that schemas, presets and plugins operate on, and the
//! validation result types.

pub mod document;
pub mod error;
pub mod validation;

pub use document::{get_path, ConfigDocument, ValueKind};
pub use error::{Result, SatinError, StorageError};
pub use validation::{ValidationErrorKind, ValidationIssue, ValidationResult};
