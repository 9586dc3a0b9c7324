//! Plugin registry for Satin.
//!
//! Plugins are described by a [`PluginDescriptor`] (usually read from a
//! `plugin.yaml` manifest), their configuration is checked against a schema
//! from the [`satin_config::SchemaRegistry`], and their code is reached through
//! a [`PluginHandle`] the host provides.

pub mod discovery;
pub mod host;
pub mod registry;
pub mod types;

pub use discovery::{discover_plugins, load_manifest};
pub use host::{PluginHandle, PluginHost, StaticPluginHost};
pub use registry::PluginRegistry;
pub use types::{HookReport, PluginDescriptor, PluginManifest, PluginState};
