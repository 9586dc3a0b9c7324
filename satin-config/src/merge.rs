use chrono::Utc;
use satin_core::{ConfigDocument, Result};
use serde_json::Value;

use crate::preset::{next_version, Preset, PresetMetadata};

/// Merge `update` into a copy of `base`; `update` wins on every conflict.
///
/// Mappings merge key by key. Arrays and scalars in `update` replace whatever
/// `base` held at that key.
pub fn merge_documents(base: &ConfigDocument, update: &ConfigDocument) -> ConfigDocument {
    let mut merged = base.clone();
    merge_into(&mut merged, update.clone());
    merged
}

/// Merge two presets into the next version of `base`.
///
/// The result keeps the base name and creation time; neither input changes.
/// Fails with `VersionOverflow` when `base` is already at `u32::MAX`.
pub fn merge(base: &Preset, update: &Preset) -> Result<Preset> {
    Ok(Preset {
        name: base.name.clone(),
        version: next_version(&base.name, base.version)?,
        parameters: merge_documents(&base.parameters, &update.parameters),
        metadata: PresetMetadata {
            created_at: base.metadata.created_at,
            modified_at: Utc::now(),
        },
    })
}

/// Fold `updates` into `base` left to right, one version per update.
pub fn merge_all<'a, I>(base: &Preset, updates: I) -> Result<Preset>
where
    I: IntoIterator<Item = &'a Preset>,
{
    updates
        .into_iter()
        .try_fold(base.clone(), |acc, update| merge(&acc, update))
}

fn merge_into(base: &mut ConfigDocument, overlay: ConfigDocument) {
    for (key, overlay_value) in overlay {
        match base.get_mut(&key) {
            Some(base_value) => deep_merge(base_value, overlay_value),
            None => {
                base.insert(key, overlay_value);
            }
        }
    }
}

/// Deep merge JSON values recursively
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => merge_into(base_map, overlay_map),
        (base_val, overlay_val) => {
            // Anything that isn't mapping-over-mapping is replaced, arrays included
            *base_val = overlay_val;
        }
    }
}
