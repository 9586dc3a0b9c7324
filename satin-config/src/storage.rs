//! Storage collaborators for the preset store.
//!
//! Storage only keeps snapshots; version numbering and name rules belong to
//! [`PresetStore`](crate::preset::PresetStore). A snapshot, once written, is
//! never rewritten.

use fs2::FileExt;
use satin_core::StorageError;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::preset::Preset;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persists preset snapshots, one per (name, version).
pub trait PresetStorage: Send + Sync {
    /// Store a new snapshot. Fails if that version already exists.
    fn write(&self, preset: &Preset) -> StorageResult<()>;

    fn read(&self, name: &str, version: u32) -> StorageResult<Option<Preset>>;

    /// Stored versions of `name`, ascending. Empty when the name is unknown.
    fn versions(&self, name: &str) -> StorageResult<Vec<u32>>;

    /// Every stored preset name, sorted.
    fn names(&self) -> StorageResult<Vec<String>>;

    /// Remove every version of `name`. Returns whether anything was removed.
    fn remove(&self, name: &str) -> StorageResult<bool>;
}

fn snapshot_key(name: &str, version: u32) -> String {
    format!("{}@v{}", name, version)
}

/// In-process storage, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    presets: RwLock<BTreeMap<String, BTreeMap<u32, Preset>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresetStorage for MemoryStorage {
    fn write(&self, preset: &Preset) -> StorageResult<()> {
        let mut presets = self.presets.write().unwrap_or_else(PoisonError::into_inner);
        let versions = presets.entry(preset.name.clone()).or_default();
        if versions.contains_key(&preset.version) {
            return Err(StorageError::new(
                "write",
                snapshot_key(&preset.name, preset.version),
                "snapshot already exists",
            ));
        }
        versions.insert(preset.version, preset.clone());
        Ok(())
    }

    fn read(&self, name: &str, version: u32) -> StorageResult<Option<Preset>> {
        Ok(self
            .presets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|versions| versions.get(&version))
            .cloned())
    }

    fn versions(&self, name: &str) -> StorageResult<Vec<u32>> {
        Ok(self
            .presets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .presets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn remove(&self, name: &str) -> StorageResult<bool> {
        Ok(self
            .presets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some())
    }
}

/// Directory-backed storage: `<root>/<name>/v<N>.json`.
///
/// Writers take an exclusive `fs2` lock on `<root>/<name>/.lock`, so several
/// processes can share one root.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<name>`; `name` must be one plain path component so nothing
    /// resolves outside the root.
    fn preset_dir(&self, name: &str, operation: &'static str) -> StorageResult<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None)
                if part.to_str() == Some(name) && !name.starts_with('.') =>
            {
                Ok(self.root.join(name))
            }
            _ => Err(StorageError::new(
                operation,
                name,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "preset name must be a single path component",
                ),
            )),
        }
    }

    fn snapshot_path(
        &self,
        name: &str,
        version: u32,
        operation: &'static str,
    ) -> StorageResult<PathBuf> {
        Ok(self
            .preset_dir(name, operation)?
            .join(format!("v{}.json", version)))
    }

    fn acquire_lock(&self, name: &str, operation: &'static str) -> StorageResult<File> {
        let lock_path = self.preset_dir(name, operation)?.join(".lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StorageError::new(operation, name, e))?;

        lock_file
            .lock_exclusive()
            .map_err(|e| StorageError::new(operation, name, e))?;

        Ok(lock_file)
    }
}

fn parse_version(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix('v')?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

impl PresetStorage for FileStorage {
    fn write(&self, preset: &Preset) -> StorageResult<()> {
        let key = snapshot_key(&preset.name, preset.version);
        let dir = self.preset_dir(&preset.name, "write")?;
        fs::create_dir_all(&dir).map_err(|e| StorageError::new("write", &key, e))?;

        let _lock = self.acquire_lock(&preset.name, "write")?;

        let target = dir.join(format!("v{}.json", preset.version));
        if target.exists() {
            return Err(StorageError::new(
                "write",
                key,
                io::Error::new(io::ErrorKind::AlreadyExists, "snapshot already exists"),
            ));
        }

        let json = serde_json::to_string_pretty(preset)
            .map_err(|e| StorageError::new("write", &key, e))?;

        let mut temp_file = tempfile::Builder::new()
            .prefix(".snapshot-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| StorageError::new("write", &key, e))?;

        temp_file
            .write_all(json.as_bytes())
            .and_then(|_| temp_file.as_file().sync_all())
            .map_err(|e| StorageError::new("write", &key, e))?;

        temp_file
            .persist_noclobber(&target)
            .map_err(|e| StorageError::new("write", &key, e.error))?;

        Ok(())
    }

    fn read(&self, name: &str, version: u32) -> StorageResult<Option<Preset>> {
        let path = self.snapshot_path(name, version, "read")?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::new("read", snapshot_key(name, version), e)),
        };

        let preset = serde_json::from_str(&content)
            .map_err(|e| StorageError::new("read", snapshot_key(name, version), e))?;
        Ok(Some(preset))
    }

    fn versions(&self, name: &str) -> StorageResult<Vec<u32>> {
        let entries = match fs::read_dir(self.preset_dir(name, "list versions")?) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::new("list versions", name, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::new("list versions", name, e))?;
            if let Some(version) = entry.file_name().to_str().and_then(parse_version) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        let root = self.root.display().to_string();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::new("list", root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::new("list", &root, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| StorageError::new("list", &root, e))?
                .is_dir();
            match entry.file_name().into_string() {
                Ok(name) if is_dir && !name.starts_with('.') => names.push(name),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, name: &str) -> StorageResult<bool> {
        let dir = self.preset_dir(name, "remove")?;
        if !dir.is_dir() {
            return Ok(false);
        }

        let _lock = self.acquire_lock(name, "remove")?;
        fs::remove_dir_all(&dir).map_err(|e| StorageError::new("remove", name, e))?;
        Ok(true)
    }
}
