//! Workspace Index: the top-level record over a multi-bundle workspace
//! (§3, §4.J).
//!
//! Single file `<out>/.quack/workspace.json`, mutated only through
//! `WorkspaceIndexStore::update`, which load-modify-stores under an advisory
//! lock on a sibling `.lock` file. The lock is released via an RAII guard
//! (`scopeguard`) so a panicking updater closure can't leave the workspace
//! permanently locked.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::QuackError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub build_id: String,
    pub bundle_path: PathBuf,
    pub bundle_hash: String,
    pub created_at: u64,
    pub merkle_root: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSummary {
    pub file: PathBuf,
    pub from_v: String,
    pub to_v: String,
    pub change_count: u64,
    pub size: u64,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDefinition {
    pub source_dir: PathBuf,
    pub priority: Option<i32>,
    pub deps: Vec<String>,
    pub load_trigger: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleIndex {
    pub name: String,
    pub current_version: String,
    pub latest: BuildSummary,
    pub previous: Vec<BuildSummary>,
    pub patches: Vec<PatchSummary>,
    pub definition: BundleDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceIndex {
    pub workspace_name: String,
    pub schema_version: u32,
    pub current_version: u64,
    pub bundles: BTreeMap<String, BundleIndex>,
    pub global_patches: Vec<PatchSummary>,
}

impl WorkspaceIndex {
    pub fn new(workspace_name: impl Into<String>) -> WorkspaceIndex {
        WorkspaceIndex {
            workspace_name: workspace_name.into(),
            schema_version: 1,
            current_version: 0,
            bundles: BTreeMap::new(),
            global_patches: Vec::new(),
        }
    }
}

pub struct WorkspaceIndexStore {
    root: PathBuf,
}

impl WorkspaceIndexStore {
    pub fn new(output_root: &Path) -> WorkspaceIndexStore {
        WorkspaceIndexStore { root: output_root.join(".quack") }
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("workspace.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn load(&self) -> Result<Option<WorkspaceIndex>, QuackError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|e| QuackError::Io { source: e, path: path.clone() })?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Acquires the advisory lock, loads the current index (or `default_if_absent`
    /// for a first-time workspace), runs `mutator`, and writes the result back.
    /// Returns `ConcurrentUpdate` if the on-disk `current_version` advanced
    /// between `load` and write — meaning some other writer committed without
    /// holding this lock.
    pub fn update<F>(&self, default_if_absent: impl FnOnce() -> WorkspaceIndex, mutator: F) -> Result<WorkspaceIndex, QuackError>
    where
        F: FnOnce(&mut WorkspaceIndex) -> Result<(), QuackError>,
    {
        std::fs::create_dir_all(&self.root).map_err(|e| QuackError::Io { source: e, path: self.root.clone() })?;

        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| QuackError::Io { source: e, path: lock_path.clone() })?;
        drop(lock_file);

        let _guard = scopeguard::guard((), |_| {
            let _ = std::fs::remove_file(&lock_path);
        });

        let before = self.load()?;
        let before_version = before.as_ref().map(|w| w.current_version);

        let mut index = before.unwrap_or_else(default_if_absent);
        mutator(&mut index)?;

        // Re-check the version cursor hadn't moved under us while we were
        // computing the mutation — the lock file prevents a *concurrent*
        // writer from entering this block at all, so in practice this only
        // fires if the lock was bypassed externally.
        let after_on_disk = self.load()?;
        if after_on_disk.as_ref().map(|w| w.current_version) != before_version {
            return Err(QuackError::ConcurrentUpdate);
        }

        let json = serde_json::to_vec_pretty(&index)?;
        let path = self.index_path();
        std::fs::write(&path, &json).map_err(|e| QuackError::Io { source: e, path })?;

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_creates_workspace_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceIndexStore::new(dir.path());
        let index = store
            .update(
                || WorkspaceIndex::new("main-workspace"),
                |idx| {
                    idx.current_version += 1;
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(index.current_version, 1);
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn update_persists_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceIndexStore::new(dir.path());
        store
            .update(|| WorkspaceIndex::new("main"), |idx| { idx.current_version += 1; Ok(()) })
            .unwrap();
        let second = store
            .update(|| WorkspaceIndex::new("main"), |idx| { idx.current_version += 1; Ok(()) })
            .unwrap();
        assert_eq!(second.current_version, 2);
    }

    #[test]
    fn lock_file_is_released_even_if_mutator_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceIndexStore::new(dir.path());
        let result = store.update(
            || WorkspaceIndex::new("main"),
            |_idx| Err(QuackError::Validation("boom".into())),
        );
        assert!(result.is_err());
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn concurrent_lock_acquisition_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceIndexStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join(".quack")).unwrap();
        std::fs::write(store.lock_path(), b"").unwrap();

        let err = store
            .update(|| WorkspaceIndex::new("main"), |idx| { idx.current_version += 1; Ok(()) })
            .unwrap_err();
        assert_eq!(err.kind_tag(), "io");
    }
}
