use anyhow::{Context, Result};
use satin_logging::Logger;
use std::fs;
use std::path::Path;

use crate::types::PluginManifest;

/// Reads `<plugins_dir>/<plugin>/plugin.yaml` for every plugin directory, in
/// directory name order.
///
/// A missing `plugins_dir` yields no plugins. Manifests that cannot be read or
/// parsed are logged as warnings and skipped.
pub fn discover_plugins(plugins_dir: &Path, logger: &dyn Logger) -> Result<Vec<PluginManifest>> {
    if !plugins_dir.exists() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(plugins_dir)
        .with_context(|| format!("Failed to read plugins directory: {plugins_dir:?}"))?
    {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut manifests = Vec::with_capacity(dirs.len());
    for path in dirs {
        match load_manifest(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => {
                logger.warn(&format!("Failed to load plugin from {path:?}: {e:#}"));
            }
        }
    }
    Ok(manifests)
}

/// Loads and checks a single plugin manifest
pub fn load_manifest(plugin_dir: &Path) -> Result<PluginManifest> {
    let manifest_path = plugin_dir.join("plugin.yaml");

    if !manifest_path.exists() {
        anyhow::bail!("Plugin manifest not found: {manifest_path:?}");
    }

    let content = fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read plugin manifest: {manifest_path:?}"))?;

    let manifest: PluginManifest = serde_yaml_ng::from_str(&content)
        .with_context(|| format!("Failed to parse plugin manifest: {manifest_path:?}"))?;

    for (field, value) in [
        ("id", &manifest.id),
        ("version", &manifest.version),
        ("entry", &manifest.entry),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("Plugin manifest {manifest_path:?} has an empty '{field}'");
        }
    }

    Ok(manifest)
}
