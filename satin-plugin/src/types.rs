use satin_core::ConfigDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plugin metadata (stored in plugin.yaml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub version: String,
    /// Opaque key the host resolves to a plugin handle
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the schema the plugin's config must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "ConfigDocument::is_empty")]
    pub config: ConfigDocument,
}

/// Lifecycle state of a registered plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Registered,
    Validated,
    Active,
    Failed,
    Deactivated,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Registered => "registered",
            PluginState::Validated => "validated",
            PluginState::Active => "active",
            PluginState::Failed => "failed",
            PluginState::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin as the registry sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: String,
    pub entry: String,
    pub description: Option<String>,
    pub schema: Option<String>,
    pub config: ConfigDocument,
    pub state: PluginState,
    pub last_error: Option<String>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: "0.0.0".to_string(),
            entry: entry.into(),
            description: None,
            schema: None,
            config: ConfigDocument::new(),
            state: PluginState::Registered,
            last_error: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_config(mut self, config: ConfigDocument) -> Self {
        self.config = config;
        self
    }

    pub fn is_active(&self) -> bool {
        self.state == PluginState::Active
    }
}

impl From<PluginManifest> for PluginDescriptor {
    fn from(manifest: PluginManifest) -> Self {
        Self {
            id: manifest.id,
            version: manifest.version,
            entry: manifest.entry,
            description: manifest.description,
            schema: manifest.schema,
            config: manifest.config,
            state: PluginState::Registered,
            last_error: None,
        }
    }
}

/// Outcome of dispatching one hook to every active plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HookReport {
    pub hook: String,
    /// Plugins whose handler returned `Ok`, in dispatch order
    pub succeeded: Vec<String>,
    /// `(plugin id, error)` for every handler that failed
    pub failed: Vec<(String, String)>,
}

impl HookReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
