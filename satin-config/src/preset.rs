//! Named, versioned presets.
//!
//! Saving never overwrites: each save under an existing name appends the next
//! version and keeps every earlier one. Writers for the same name are
//! serialized by a per-name mutex; readers take no store-level lock.

use chrono::{DateTime, Utc};
use satin_core::{ConfigDocument, Result, SatinError};
use satin_logging::Logger;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::instrument;

use crate::diff::{diff_documents, DiffEntry};
use crate::schema::Schema;
use crate::storage::PresetStorage;
use crate::validator::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetMetadata {
    /// When version 1 was saved
    pub created_at: DateTime<Utc>,
    /// When this version was written
    pub modified_at: DateTime<Utc>,
}

/// One immutable snapshot of a named parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub version: u32,
    pub parameters: ConfigDocument,
    pub metadata: PresetMetadata,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetSummary {
    pub name: String,
    pub latest_version: u32,
    pub modified_at: DateTime<Utc>,
}

/// Check a preset name: non-empty, `[A-Za-z0-9._-]`, no leading dot.
pub fn validate_preset_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| SatinError::InvalidPresetName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("name cannot start with '.'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(SatinError::InvalidPresetName {
            name: name.to_string(),
            reason: format!("character '{}' is not allowed", c),
        });
    }
    Ok(())
}

pub struct PresetStore {
    storage: Arc<dyn PresetStorage>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    logger: Arc<dyn Logger>,
}

impl PresetStore {
    pub fn new(storage: Arc<dyn PresetStorage>, logger: Arc<dyn Logger>) -> Self {
        Self {
            storage,
            locks: Mutex::new(HashMap::new()),
            logger,
        }
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Drop the table entry for `name` when the caller holds the only other
    /// reference to it. Clones are only handed out under the table lock, so
    /// no writer can be queued on a mutex that is no longer in the table.
    fn release_lock(&self, name: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, lock) && Arc::strong_count(current) == 2);
        if idle {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Save `parameters` as the next version of `name`.
    #[instrument(skip(self, parameters), fields(name = %name))]
    pub fn save(&self, name: &str, parameters: ConfigDocument) -> Result<Preset> {
        validate_preset_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.append_version(name, parameters)
    }

    /// Caller must hold the name lock.
    fn append_version(&self, name: &str, parameters: ConfigDocument) -> Result<Preset> {
        let now = Utc::now();
        let latest = self.storage.versions(name)?.last().copied();

        let (version, created_at) = match latest {
            Some(latest) => {
                let created_at = self
                    .storage
                    .read(name, latest)?
                    .map(|p| p.metadata.created_at)
                    .unwrap_or(now);
                (next_version(name, latest)?, created_at)
            }
            None => (1, now),
        };

        let preset = Preset {
            name: name.to_string(),
            version,
            parameters,
            metadata: PresetMetadata {
                created_at,
                modified_at: now,
            },
        };
        self.storage.write(&preset)?;
        self.logger.info(&format!("Saved preset {}", preset));
        Ok(preset)
    }

    /// Load `version` of `name`, or the latest when `version` is `None`.
    pub fn load(&self, name: &str, version: Option<u32>) -> Result<Preset> {
        validate_preset_name(name)?;
        let version = match version {
            Some(version) => version,
            None => self.latest_version(name)?,
        };
        self.storage
            .read(name, version)?
            .ok_or_else(|| SatinError::PresetNotFound {
                name: name.to_string(),
                version: Some(version),
            })
    }

    fn latest_version(&self, name: &str) -> Result<u32> {
        self.storage
            .versions(name)?
            .last()
            .copied()
            .ok_or_else(|| SatinError::PresetNotFound {
                name: name.to_string(),
                version: None,
            })
    }

    /// Remove every version of `name`.
    #[instrument(skip(self), fields(name = %name))]
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_preset_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let removed = self.storage.remove(name)?;
        self.release_lock(name, &lock);
        if !removed {
            return Err(SatinError::PresetNotFound {
                name: name.to_string(),
                version: None,
            });
        }
        self.logger.info(&format!("Deleted preset '{}'", name));
        Ok(())
    }

    /// One summary per stored preset, ordered by name.
    pub fn list(&self) -> Result<Vec<PresetSummary>> {
        let mut summaries = Vec::new();
        for name in self.storage.names()? {
            let Some(latest) = self.storage.versions(&name)?.last().copied() else {
                continue;
            };
            if let Some(preset) = self.storage.read(&name, latest)? {
                summaries.push(PresetSummary {
                    name,
                    latest_version: latest,
                    modified_at: preset.metadata.modified_at,
                });
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Stored versions of `name`, ascending.
    pub fn history(&self, name: &str) -> Result<Vec<u32>> {
        validate_preset_name(name)?;
        let versions = self.storage.versions(name)?;
        if versions.is_empty() {
            return Err(SatinError::PresetNotFound {
                name: name.to_string(),
                version: None,
            });
        }
        Ok(versions)
    }

    /// Save the parameters of an old version as the new latest version.
    #[instrument(skip(self), fields(name = %name))]
    pub fn rollback(&self, name: &str, version: u32) -> Result<Preset> {
        validate_preset_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let old = self
            .storage
            .read(name, version)?
            .ok_or_else(|| SatinError::PresetNotFound {
                name: name.to_string(),
                version: Some(version),
            })?;
        let restored = self.append_version(name, old.parameters)?;
        self.logger.info(&format!(
            "Rolled back preset '{}' to v{} as v{}",
            name, version, restored.version
        ));
        Ok(restored)
    }

    /// Differences between two stored versions of one preset.
    pub fn diff_versions(&self, name: &str, from: u32, to: u32) -> Result<Vec<DiffEntry>> {
        validate_preset_name(name)?;
        let a = self.load(name, Some(from))?;
        let b = self.load(name, Some(to))?;
        Ok(diff_documents(&a.parameters, &b.parameters))
    }

    /// Names whose latest parameters mention `keyword` in a key or string
    /// value, ignoring case.
    pub fn search(&self, keyword: &str) -> Result<Vec<String>> {
        let needle = keyword.to_lowercase();
        let mut matches = Vec::new();
        for name in self.storage.names()? {
            let Some(latest) = self.storage.versions(&name)?.last().copied() else {
                continue;
            };
            let Some(preset) = self.storage.read(&name, latest)? else {
                continue;
            };
            if preset
                .parameters
                .iter()
                .any(|(k, v)| k.to_lowercase().contains(&needle) || mentions(v, &needle))
            {
                matches.push(name);
            }
        }
        self.logger.debug(&format!(
            "Search for '{}' matched {} preset(s)",
            keyword,
            matches.len()
        ));
        Ok(matches)
    }

    /// Validate, then save. Invalid documents are refused and nothing is stored.
    #[instrument(skip(self, parameters, schema, validator), fields(name = %name, schema = %schema.name()))]
    pub fn save_validated(
        &self,
        name: &str,
        parameters: ConfigDocument,
        schema: &Schema,
        validator: &Validator,
    ) -> Result<Preset> {
        validate_preset_name(name)?;
        let result = validator.validate(schema, &parameters);
        if !result.is_valid() {
            self.logger.warn(&format!(
                "Refusing to save preset '{}': {} validation error(s)",
                name,
                result.errors().len()
            ));
            return Err(SatinError::ValidationFailed {
                subject: format!("preset '{}'", name),
                result,
            });
        }
        self.save(name, parameters)
    }
}

/// Version after `current`, refusing to wrap.
pub(crate) fn next_version(name: &str, current: u32) -> Result<u32> {
    current
        .checked_add(1)
        .ok_or_else(|| SatinError::VersionOverflow {
            name: name.to_string(),
            version: current,
        })
}

fn mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| mentions(v, needle)),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| k.to_lowercase().contains(needle) || mentions(v, needle)),
        _ => false,
    }
}
