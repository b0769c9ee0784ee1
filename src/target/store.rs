//! Persistence port for target records.
//!
//! One record per target, keyed by id, written on every create, update and
//! revoke. The registry owns a boxed store; nothing else writes target files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use super::{TargetSystem, check_record_id};
use crate::errors::TargetError;

/// Durable storage for `TargetSystem` records.
pub trait TargetStore: Send + Sync {
    /// Write (create or replace) one record.
    fn save(&self, target: &TargetSystem) -> Result<(), TargetError>;

    /// Remove a record. Removing a missing record is not an error.
    fn delete(&self, id: &str) -> Result<(), TargetError>;

    /// Load every stored record.
    fn load_all(&self) -> Result<Vec<TargetSystem>, TargetError>;
}

/// Stores each target as `target_<id>.json` inside one directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open (and create if needed) the targets directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, TargetError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| TargetError::Persistence {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, TargetError> {
        check_record_id(id)?;
        Ok(self.dir.join(format!("target_{}.json", id)))
    }
}

impl TargetStore for JsonDirStore {
    fn save(&self, target: &TargetSystem) -> Result<(), TargetError> {
        let path = self.path_for(&target.id)?;
        let json = serde_json::to_string_pretty(target)?;
        fs::write(&path, json).map_err(|source| TargetError::Persistence {
            path: path.clone(),
            source,
        })?;
        debug!(target_id = %target.id, path = %path.display(), "persisted target");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), TargetError> {
        let path = self.path_for(id)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|source| TargetError::Persistence {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<TargetSystem>, TargetError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| TargetError::Persistence {
            path: self.dir.clone(),
            source,
        })?;

        let mut targets = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("target_") && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_record {
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|source| TargetError::Persistence {
                path: path.clone(),
                source,
            })?;
            match serde_json::from_str::<TargetSystem>(&content) {
                Ok(target) => targets.push(target),
                // A corrupt record is skipped, not fatal.
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable target record"),
            }
        }

        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(targets)
    }
}

/// Process-lifetime store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, TargetSystem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TargetStore for MemoryStore {
    fn save(&self, target: &TargetSystem) -> Result<(), TargetError> {
        self.records
            .lock()
            .map_err(|_| TargetError::LockPoisoned)?
            .insert(target.id.clone(), target.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), TargetError> {
        self.records
            .lock()
            .map_err(|_| TargetError::LockPoisoned)?
            .remove(id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<TargetSystem>, TargetError> {
        let records = self.records.lock().map_err(|_| TargetError::LockPoisoned)?;
        let mut targets: Vec<TargetSystem> = records.values().cloned().collect();
        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetOs;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample(id: &str) -> TargetSystem {
        TargetSystem {
            id: id.to_string(),
            name: "Staging web".to_string(),
            host: "10.20.0.7".to_string(),
            port: Some(443),
            os: TargetOs::Linux,
            authorized: true,
            authorization_document: Some("SOW-2024-117".to_string()),
            authorization_date: Some(Utc::now()),
            authorized_by: Some("CISO".to_string()),
            scope: vec!["10.20.0.0/24".to_string()],
            out_of_scope: vec![],
            notes: String::new(),
            created_at: Utc::now(),
            last_verified: None,
        }
    }

    #[test]
    fn test_json_dir_store_writes_one_file_per_target() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::new(dir.path().join("targets")).unwrap();
        store.save(&sample("target-a")).unwrap();
        store.save(&sample("target-b")).unwrap();

        assert!(store.dir().join("target_target-a.json").exists());
        assert!(store.dir().join("target_target-b.json").exists());
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_json_dir_store_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::new(dir.path()).unwrap();
        store.save(&sample("target-a")).unwrap();
        store.delete("target-a").unwrap();
        assert!(!dir.path().join("target_target-a.json").exists());
        // Deleting again is fine.
        store.delete("target-a").unwrap();
    }

    #[test]
    fn test_json_dir_store_skips_corrupt_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::new(dir.path()).unwrap();
        store.save(&sample("target-ok")).unwrap();
        fs::write(dir.path().join("target_broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "target-ok");
    }

    #[test]
    fn test_json_dir_store_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::new(dir.path()).unwrap();
        let result = store.save(&sample("../escape"));
        assert!(matches!(result, Err(TargetError::InvalidRecord(_))));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let target = sample("target-m");
        store.save(&target).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![target]);
        store.delete("target-m").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
