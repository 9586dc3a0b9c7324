//! Host-side capabilities: how the registry reaches plugin code.
//!
//! Plugins are never loaded by name at runtime. The host process builds the
//! handles itself and exposes them through a [`PluginHost`], usually a
//! [`StaticPluginHost`] filled at startup.

use anyhow::{anyhow, Result};
use satin_core::ConfigDocument;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// The running half of a plugin.
pub trait PluginHandle: Send + Sync {
    fn initialize(&self, config: &ConfigDocument) -> Result<()>;

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn on_hook(&self, _hook: &str, _payload: &Value) -> Result<()> {
        Ok(())
    }
}

/// Resolves a descriptor's `entry` to a handle.
pub trait PluginHost: Send + Sync {
    fn resolve(&self, entry: &str) -> Result<Arc<dyn PluginHandle>>;
}

/// Explicit entry → handle table.
#[derive(Default)]
pub struct StaticPluginHost {
    handles: RwLock<HashMap<String, Arc<dyn PluginHandle>>>,
}

impl StaticPluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle(self, entry: impl Into<String>, handle: Arc<dyn PluginHandle>) -> Self {
        self.insert(entry, handle);
        self
    }

    /// Add or replace the handle for `entry`.
    pub fn insert(&self, entry: impl Into<String>, handle: Arc<dyn PluginHandle>) {
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.into(), handle);
    }

    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        entries.sort();
        entries
    }
}

impl PluginHost for StaticPluginHost {
    fn resolve(&self, entry: &str) -> Result<Arc<dyn PluginHandle>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry)
            .cloned()
            .ok_or_else(|| anyhow!("no plugin handle registered for entry '{}'", entry))
    }
}
