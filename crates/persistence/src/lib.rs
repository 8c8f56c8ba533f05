#![deny(warnings)]

//! Persistence layer: JSON save files for in-progress play-throughs.
//!
//! One file per key under a root directory. The engine never touches this;
//! the session layer checkpoints through it so a player can resume.

use chrono::{DateTime, Utc};
use game_core::ModuleId;
use game_engine::BossGameState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Bumped when the on-disk record shape changes.
pub const SAVE_SCHEMA_VERSION: u32 = 1;

/// Returns the default directory used for local saves.
pub fn default_save_dir() -> &'static str {
    "./saves"
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(String),
    #[error("corrupt save {key}: {message}")]
    Corrupt { key: String, message: String },
    #[error("save {key} has schema version {found}, expected {expected}", expected = SAVE_SCHEMA_VERSION)]
    SchemaMismatch { key: String, found: u32 },
    #[error("invalid save key {0:?}; use [A-Za-z0-9_-]")]
    InvalidKey(String),
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e.to_string())
    }
}

/// What lands on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    pub schema_version: u32,
    pub module: ModuleId,
    pub saved_at: DateTime<Utc>,
    pub state: BossGameState,
}

/// Directory-backed key-value store of [`SaveRecord`]s.
#[derive(Clone, Debug)]
pub struct SaveStore {
    root: PathBuf,
}

impl SaveStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, PersistError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    /// Write `state` under `key`, replacing any previous save.
    pub fn save(&self, key: &str, state: &BossGameState) -> Result<SaveRecord, PersistError> {
        let path = self.path_for(key)?;
        let record = SaveRecord {
            schema_version: SAVE_SCHEMA_VERSION,
            module: state.module().clone(),
            saved_at: Utc::now(),
            state: state.clone(),
        };
        let body = serde_json::to_vec_pretty(&record).map_err(|e| PersistError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        // Write-then-rename so a crash never leaves a truncated save.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        debug!(key, module = %record.module, "save written");
        Ok(record)
    }

    /// Read the save under `key`; `Ok(None)` if there is none.
    pub fn load(&self, key: &str) -> Result<Option<SaveRecord>, PersistError> {
        let path = self.path_for(key)?;
        let body = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: SaveRecord =
            serde_json::from_slice(&body).map_err(|e| PersistError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        if record.schema_version != SAVE_SCHEMA_VERSION {
            return Err(PersistError::SchemaMismatch {
                key: key.to_string(),
                found: record.schema_version,
            });
        }
        Ok(Some(record))
    }

    /// Remove the save under `key`. Returns whether one existed.
    pub fn delete(&self, key: &str) -> Result<bool, PersistError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(key, "save deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys of every save in the store, sorted.
    pub fn keys(&self) -> Result<Vec<String>, PersistError> {
        let mut keys = Vec::new();
        for ent in fs::read_dir(&self.root)? {
            let path = ent?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use content::ContentStore;
    use game_engine::{create_state, resolve_decision};

    fn state() -> BossGameState {
        let store = ContentStore::builtin().unwrap();
        let cfg = store.get("cash-flow-stress-test").unwrap();
        resolve_decision(cfg, &create_state(cfg), "phase1-bonus", "save-bonus").unwrap()
    }

    #[test]
    fn default_dir_is_relative() {
        assert!(default_save_dir().starts_with("./"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SaveStore::open(dir.path().join("saves")).unwrap();
        let s = state();
        let written = store.save("cash-flow-stress-test", &s).unwrap();
        let loaded = store.load("cash-flow-stress-test").unwrap().unwrap();
        assert_eq!(loaded, written);
        assert_eq!(loaded.state, s);
        assert_eq!(loaded.module.as_str(), "cash-flow-stress-test");
        assert_eq!(store.keys().unwrap(), vec!["cash-flow-stress-test".to_string()]);
    }

    #[test]
    fn missing_key_is_none_and_delete_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = SaveStore::open(dir.path()).unwrap();
        assert!(store.load("nothing").unwrap().is_none());
        assert!(!store.delete("nothing").unwrap());
        store.save("slot_1", &state()).unwrap();
        assert!(store.delete("slot_1").unwrap());
        assert!(store.load("slot_1").unwrap().is_none());
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = SaveStore::open(dir.path()).unwrap();
        for key in ["", "../escape", "a/b", "dot.ted"] {
            assert!(matches!(
                store.save(key, &state()),
                Err(PersistError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn corrupt_and_future_saves_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = SaveStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        assert!(matches!(
            store.load("bad"),
            Err(PersistError::Corrupt { .. })
        ));

        store.save("future", &state()).unwrap();
        let path = dir.path().join("future.json");
        let mut v: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        v["schemaVersion"] = serde_json::json!(99);
        fs::write(&path, serde_json::to_vec(&v).unwrap()).unwrap();
        assert!(matches!(
            store.load("future"),
            Err(PersistError::SchemaMismatch { found: 99, .. })
        ));
    }
}
