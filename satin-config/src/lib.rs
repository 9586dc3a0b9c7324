//! Schema validation, versioned presets and preset algebra.
//!
//! - [`schema`]: schema definitions and the [`SchemaRegistry`]
//! - [`validator`]: checks documents against schemas
//! - [`preset`] / [`storage`]: the versioned [`PresetStore`] and its storage backends
//! - [`diff`] / [`merge`]: structural comparison and deep merge of presets
//! - [`dependencies`]: reference graph between presets
//! - [`settings`]: user-wide settings file

pub mod cli;
pub mod dependencies;
pub mod diff;
pub mod merge;
pub mod preset;
pub mod schema;
pub mod settings;
pub mod storage;
pub mod validator;

pub use dependencies::{collect_dependencies, DependencyGraph, DependencySummary};
pub use diff::{diff, diff_documents, summarize, DiffEntry, DiffKind, DiffSummary};
pub use merge::{merge, merge_all, merge_documents};
pub use preset::{validate_preset_name, Preset, PresetMetadata, PresetStore, PresetSummary};
pub use schema::{
    Constraints, DependencyEffect, DependencyRule, FieldSpec, FieldType, RelationOp,
    Relationship, Schema, SchemaDefinition, SchemaRegistry,
};
pub use settings::SatinSettings;
pub use storage::{FileStorage, MemoryStorage, PresetStorage};
pub use validator::{Validator, ValidatorOptions};
