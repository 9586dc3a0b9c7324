//! User-wide settings for Satin tooling
//!
//! Stored in `~/.satin/config.yaml` (or the file named by `$SATIN_CONFIG`).
//! Every section is optional; missing sections take their defaults and keys
//! this version does not know about are preserved in `extra`.

use indexmap::IndexMap;
use satin_core::{Result, SatinError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dependencies::default_dependency_keys;

/// Root structure of the settings file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SatinSettings {
    #[serde(default, skip_serializing_if = "StorageSettings::is_default")]
    pub storage: StorageSettings,

    #[serde(default, skip_serializing_if = "SchemaSettings::is_default")]
    pub schemas: SchemaSettings,

    #[serde(default, skip_serializing_if = "PluginSettings::is_default")]
    pub plugins: PluginSettings,

    #[serde(default, skip_serializing_if = "ValidationSettings::is_default")]
    pub validation: ValidationSettings,

    #[serde(default, skip_serializing_if = "DependencySettings::is_default")]
    pub dependencies: DependencySettings,

    /// Extra configuration for extensions
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// Where presets are stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "~/.satin/presets".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl StorageSettings {
    pub fn is_default(&self) -> bool {
        self.path == default_storage_path()
    }
}

/// Directory scanned for schema files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaSettings {
    #[serde(default = "default_schemas_path")]
    pub path: String,
}

fn default_schemas_path() -> String {
    "~/.satin/schemas".to_string()
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            path: default_schemas_path(),
        }
    }
}

impl SchemaSettings {
    pub fn is_default(&self) -> bool {
        self.path == default_schemas_path()
    }
}

/// Directory scanned for plugin manifests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginSettings {
    #[serde(default = "default_plugins_path")]
    pub path: String,
}

fn default_plugins_path() -> String {
    "~/.satin/plugins".to_string()
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            path: default_plugins_path(),
        }
    }
}

impl PluginSettings {
    pub fn is_default(&self) -> bool {
        self.path == default_plugins_path()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ValidationSettings {
    /// Report fields the schema does not declare
    #[serde(default)]
    pub strict: bool,
}

impl ValidationSettings {
    pub fn is_default(&self) -> bool {
        !self.strict
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencySettings {
    /// Top-level keys whose values name other presets
    #[serde(default = "default_dependency_keys")]
    pub keys: Vec<String>,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            keys: default_dependency_keys(),
        }
    }
}

impl DependencySettings {
    pub fn is_default(&self) -> bool {
        self.keys == default_dependency_keys()
    }
}

impl SatinSettings {
    /// `$SATIN_CONFIG`, else `~/.satin/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = env::var("SATIN_CONFIG") {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::home_dir().map(|home| home.join(".satin").join("config.yaml"))
    }

    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(&content).map_err(|e| {
            SatinError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml_ng::to_string(self)?)?;
        Ok(())
    }

    pub fn storage_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.path)
    }

    pub fn schemas_dir(&self) -> PathBuf {
        expand_tilde(&self.schemas.path)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        expand_tilde(&self.plugins.path)
    }
}

/// Replace a leading `~` with the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_empty_settings_are_defaults() -> Result<()> {
        let settings: SatinSettings = serde_yaml_ng::from_str("{}")?;
        assert_eq!(settings, SatinSettings::default());
        assert_eq!(settings.dependencies.keys, vec!["base_preset", "inherits", "reference"]);
        assert!(!settings.validation.strict);
        Ok(())
    }

    #[test]
    fn test_partial_sections_and_extra_keys() -> Result<()> {
        let yaml = r#"
storage:
  path: /srv/presets
validation:
  strict: true
telemetry:
  enabled: false
"#;
        let settings: SatinSettings = serde_yaml_ng::from_str(yaml)?;
        assert_eq!(settings.storage_dir(), PathBuf::from("/srv/presets"));
        assert!(settings.validation.strict);
        assert!(settings.schemas.is_default());
        assert!(settings.extra.contains_key("telemetry"));

        let out = serde_yaml_ng::to_string(&settings)?;
        assert!(out.contains("telemetry"));
        assert!(!out.contains("schemas"));
        Ok(())
    }

    #[test]
    fn test_save_and_load_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("config.yaml");

        let mut settings = SatinSettings::default();
        settings.plugins.path = "/opt/satin/plugins".to_string();
        settings.save_to(&path)?;

        assert_eq!(SatinSettings::load_from(&path)?, settings);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_load_honours_satin_config_env() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "validation:\n  strict: true\n")?;

        env::set_var("SATIN_CONFIG", &path);
        let loaded = SatinSettings::load();
        env::remove_var("SATIN_CONFIG");

        assert!(loaded?.validation.strict);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_missing_file_yields_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        env::set_var("SATIN_CONFIG", dir.path().join("absent.yaml"));
        let loaded = SatinSettings::load();
        env::remove_var("SATIN_CONFIG");

        assert_eq!(loaded?, SatinSettings::default());
        Ok(())
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/presets"), home.join("presets"));
        }
    }
}
