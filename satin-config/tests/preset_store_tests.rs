use satin_config::{
    DiffKind, FieldSpec, FieldType, FileStorage, MemoryStorage, PresetStorage, PresetStore,
    Schema, Validator,
};
use satin_core::{document::into_document, ConfigDocument, SatinError, StorageError};
use satin_logging::{LogLevel, MemoryLogger};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn doc(value: Value) -> ConfigDocument {
    into_document(value).expect("test document must be a mapping")
}

fn memory_store() -> PresetStore {
    PresetStore::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryLogger::new()))
}

#[test]
fn test_sequential_saves_produce_gap_free_versions() -> anyhow::Result<()> {
    let store = memory_store();
    for i in 1..=5 {
        let preset = store.save("studio", doc(json!({"take": i})))?;
        assert_eq!(preset.version, i);
    }
    assert_eq!(store.history("studio")?, vec![1, 2, 3, 4, 5]);
    assert_eq!(store.load("studio", Some(3))?.parameters["take"], 3);
    Ok(())
}

#[test]
fn test_concurrent_saves_produce_gap_free_versions() -> anyhow::Result<()> {
    let store = memory_store();
    let threads = 8;
    let per_thread = 5;

    std::thread::scope(|scope| {
        for t in 0..threads {
            let store = &store;
            scope.spawn(move || {
                for i in 0..per_thread {
                    store
                        .save("shared", doc(json!({"thread": t, "i": i})))
                        .expect("save should succeed");
                }
            });
        }
    });

    let expected: Vec<u32> = (1..=threads * per_thread).collect();
    assert_eq!(store.history("shared")?, expected);
    Ok(())
}

#[test]
fn test_concurrent_saves_on_file_storage() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = PresetStore::new(
        Arc::new(FileStorage::new(dir.path())),
        Arc::new(MemoryLogger::new()),
    );

    std::thread::scope(|scope| {
        for t in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for i in 0..3 {
                    store
                        .save("disk", doc(json!({"thread": t, "i": i})))
                        .expect("save should succeed");
                }
            });
        }
    });

    assert_eq!(store.history("disk")?, (1..=12).collect::<Vec<u32>>());
    Ok(())
}

#[test]
fn test_file_storage_survives_new_store_instance() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let first = PresetStore::new(
        Arc::new(FileStorage::new(dir.path())),
        Arc::new(MemoryLogger::new()),
    );
    let v1 = first.save("avatar", doc(json!({"hair": "short", "height": 170})))?;
    first.save("avatar", doc(json!({"hair": "long", "height": 170})))?;
    first.save("scene", doc(json!({"lights": 3})))?;
    drop(first);

    let second = PresetStore::new(
        Arc::new(FileStorage::new(dir.path())),
        Arc::new(MemoryLogger::new()),
    );
    let latest = second.load("avatar", None)?;
    assert_eq!(latest.version, 2);
    assert_eq!(latest.parameters["hair"], "long");
    assert_eq!(latest.metadata.created_at, v1.metadata.created_at);
    assert_eq!(second.load("avatar", Some(1))?, v1);

    let names: Vec<String> = second.list()?.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["avatar".to_string(), "scene".to_string()]);
    Ok(())
}

#[test]
fn test_list_reports_latest_version() -> anyhow::Result<()> {
    let store = memory_store();
    store.save("b", doc(json!({})))?;
    store.save("a", doc(json!({})))?;
    store.save("a", doc(json!({})))?;

    let summaries = store.list()?;
    assert_eq!(summaries.len(), 2);
    assert_eq!((summaries[0].name.as_str(), summaries[0].latest_version), ("a", 2));
    assert_eq!((summaries[1].name.as_str(), summaries[1].latest_version), ("b", 1));
    Ok(())
}

#[test]
fn test_missing_names_and_versions() -> anyhow::Result<()> {
    let store = memory_store();
    store.save("real", doc(json!({"a": 1})))?;

    assert!(matches!(
        store.load("ghost", None),
        Err(SatinError::PresetNotFound { version: None, .. })
    ));
    assert!(matches!(
        store.load("real", Some(9)),
        Err(SatinError::PresetNotFound { version: Some(9), .. })
    ));
    assert!(matches!(
        store.delete("ghost"),
        Err(SatinError::PresetNotFound { .. })
    ));
    assert!(matches!(
        store.history("ghost"),
        Err(SatinError::PresetNotFound { .. })
    ));
    assert!(matches!(
        store.save("../escape", doc(json!({}))),
        Err(SatinError::InvalidPresetName { .. })
    ));
    Ok(())
}

#[test]
fn test_delete_removes_every_version() -> anyhow::Result<()> {
    let store = memory_store();
    store.save("temp", doc(json!({"a": 1})))?;
    store.save("temp", doc(json!({"a": 2})))?;
    store.delete("temp")?;

    assert!(store.list()?.is_empty());
    // A later save starts over at v1.
    assert_eq!(store.save("temp", doc(json!({})))?.version, 1);
    Ok(())
}

#[test]
fn test_rollback_appends_old_parameters() -> anyhow::Result<()> {
    let store = memory_store();
    store.save("look", doc(json!({"tone": "warm"})))?;
    store.save("look", doc(json!({"tone": "cold"})))?;

    let restored = store.rollback("look", 1)?;
    assert_eq!(restored.version, 3);
    assert_eq!(restored.parameters["tone"], "warm");
    assert_eq!(store.history("look")?, vec![1, 2, 3]);

    assert!(matches!(
        store.rollback("look", 7),
        Err(SatinError::PresetNotFound { version: Some(7), .. })
    ));
    Ok(())
}

#[test]
fn test_diff_versions() -> anyhow::Result<()> {
    let store = memory_store();
    store.save("cfg", doc(json!({"x": 1, "y": 2})))?;
    store.save("cfg", doc(json!({"x": 1, "y": 3, "z": 5})))?;

    let entries = store.diff_versions("cfg", 1, 2)?;
    let kinds: Vec<(&str, DiffKind)> = entries.iter().map(|e| (e.path.as_str(), e.kind)).collect();
    assert_eq!(kinds, vec![("y", DiffKind::Changed), ("z", DiffKind::Added)]);
    Ok(())
}

#[test]
fn test_save_validated_refuses_invalid_documents() -> anyhow::Result<()> {
    let logger = Arc::new(MemoryLogger::new());
    let store = PresetStore::new(Arc::new(MemoryStorage::new()), logger.clone());
    let validator = Validator::new(logger.clone());
    let schema = Schema::new(
        "render",
        vec![FieldSpec::new("samples", FieldType::Number).required().min(1.0)],
    )?;

    let err = store
        .save_validated("draft", doc(json!({"samples": 0})), &schema, &validator)
        .unwrap_err();
    match err {
        SatinError::ValidationFailed { subject, result } => {
            assert_eq!(subject, "preset 'draft'");
            assert_eq!(result.errors().len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.list()?.is_empty());
    assert_eq!(logger.messages_at(LogLevel::Warn).len(), 1);

    let saved = store.save_validated("draft", doc(json!({"samples": 64})), &schema, &validator)?;
    assert_eq!(saved.version, 1);
    Ok(())
}

/// Storage that fails every write.
struct ReadOnlyStorage;

impl PresetStorage for ReadOnlyStorage {
    fn write(&self, preset: &satin_config::Preset) -> Result<(), StorageError> {
        Err(StorageError::new(
            "write",
            format!("{}@v{}", preset.name, preset.version),
            "storage is read-only",
        ))
    }

    fn read(&self, _: &str, _: u32) -> Result<Option<satin_config::Preset>, StorageError> {
        Ok(None)
    }

    fn versions(&self, _: &str) -> Result<Vec<u32>, StorageError> {
        Ok(Vec::new())
    }

    fn names(&self) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }

    fn remove(&self, _: &str) -> Result<bool, StorageError> {
        Ok(false)
    }
}

#[test]
fn test_storage_failures_propagate() {
    let store = PresetStore::new(Arc::new(ReadOnlyStorage), Arc::new(MemoryLogger::new()));
    let err = store.save("any", doc(json!({}))).unwrap_err();
    match err {
        SatinError::Storage(storage) => {
            assert_eq!(storage.operation, "write");
            assert_eq!(storage.key, "any@v1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn assert_invalid_name<T: std::fmt::Debug>(result: satin_core::Result<T>, name: &str) {
    assert!(
        matches!(result, Err(SatinError::InvalidPresetName { .. })),
        "{name:?} was accepted: {result:?}"
    );
}

#[test]
fn test_every_entry_point_rejects_bad_names() -> anyhow::Result<()> {
    let store = memory_store();
    for name in ["", ".", "..", "../x", "a/b", ".hidden", "/abs"] {
        assert_invalid_name(store.save(name, doc(json!({}))), name);
        assert_invalid_name(store.load(name, None), name);
        assert_invalid_name(store.load(name, Some(1)), name);
        assert_invalid_name(store.delete(name), name);
        assert_invalid_name(store.history(name), name);
        assert_invalid_name(store.rollback(name, 1), name);
        assert_invalid_name(store.diff_versions(name, 1, 2), name);
    }
    Ok(())
}

#[test]
fn test_file_store_cannot_reach_outside_its_root() -> anyhow::Result<()> {
    let outside = TempDir::new()?;
    let root = outside.path().join("presets");
    std::fs::write(outside.path().join("precious.txt"), "keep")?;

    let store = PresetStore::new(
        Arc::new(FileStorage::new(&root)),
        Arc::new(MemoryLogger::new()),
    );
    store.save("keep", doc(json!({"a": 1})))?;

    assert_invalid_name(store.delete(""), "");
    assert_invalid_name(store.delete(".."), "..");
    assert_invalid_name(store.load("../presets/keep", None), "../presets/keep");
    assert_invalid_name(store.load("../x", None), "../x");
    assert_invalid_name(store.rollback("a/b", 1), "a/b");

    assert!(outside.path().join("precious.txt").exists());
    assert_eq!(store.history("keep")?, vec![1]);

    // The storage trait is public, so it guards its own paths as well.
    let storage = FileStorage::new(&root);
    let err = storage.remove("..").unwrap_err();
    assert_eq!(err.operation, "remove");
    assert!(storage.read("../presets/keep", 1).is_err());
    assert!(root.join("keep").join("v1.json").exists());
    Ok(())
}
