//! Build Log Store: append-only per-bundle build records (§3, §4.I).
//!
//! Layout: `<out>/.quack/builds/<bundle_name>/<bundle_version>-<build_id>.json`,
//! plus a secondary `_index.json` per bundle name mapping `bundle_version` and
//! `build_id` to the log file name for O(1) lookup. Grounded in the same
//! append-only-directory-plus-index pattern the Workspace Index (`workspace.rs`)
//! uses for the top-level store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::QuackError;
use crate::manifest::Manifest;
use crate::merkle::MerkleTree;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLogEntry {
    pub hash: String,
    pub size: u64,
    pub version: String,
    pub mtime: u64,
    /// The asset's first declared locale. The build log otherwise addresses
    /// assets by `relative_path` alone (§3); patch operations need a
    /// `(path, locale)` pair to target an index row (§4.L), so the Diff/Patch
    /// Writer resolve locale through this field rather than re-deriving it
    /// from the Manifest.
    pub primary_locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildLog {
    pub bundle_name: String,
    pub bundle_version: String,
    pub build_id: String,
    pub created_at: u64,
    pub bundle_path: PathBuf,
    pub bundle_hash: String,
    pub totals: crate::manifest::Totals,
    pub assets: BTreeMap<String, AssetLogEntry>,
    pub merkle_levels: Vec<Vec<String>>,
    pub merkle_root: String,
    pub build_stats: BuildStatsEntry,
}

/// `build_stats` as it appears on disk: `{proc_ms, compress_ratio, locales[]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStatsEntry {
    pub proc_ms: u64,
    pub compress_ratio: f64,
    pub locales: Vec<String>,
}

impl BuildLog {
    /// Builds a log entry from a just-written manifest and the raw bundle
    /// file bytes (hashed once here, since the bundle file itself is never
    /// re-opened by the Writer after rename).
    pub fn from_manifest(
        manifest: &Manifest,
        bundle_path: &Path,
        bundle_bytes: &[u8],
        merkle_tree: &MerkleTree,
        created_at: u64,
        proc_ms: u64,
    ) -> BuildLog {
        let mut assets = BTreeMap::new();
        for by_path in manifest.assets.values() {
            for (path, entry) in by_path {
                assets.insert(
                    path.clone(),
                    AssetLogEntry {
                        hash: entry.content_hash.clone(),
                        size: entry.size,
                        version: entry.version.clone(),
                        mtime: entry.mtime,
                        primary_locale: entry.primary_locale().to_string(),
                    },
                );
            }
        }

        let compress_ratio = if manifest.totals.size == 0 {
            1.0
        } else {
            let stored: u64 = manifest.assets.values().flat_map(|m| m.values()).map(|e| e.stored_size).sum();
            stored as f64 / manifest.totals.size as f64
        };

        BuildLog {
            bundle_name: manifest.name.clone(),
            bundle_version: manifest.bundle_version.clone(),
            build_id: manifest.build_id.clone(),
            created_at,
            bundle_path: bundle_path.to_path_buf(),
            bundle_hash: crate::hash::hash_bytes_hex(bundle_bytes),
            totals: manifest.totals,
            assets,
            merkle_levels: merkle_tree.levels.clone(),
            merkle_root: merkle_tree.root().to_string(),
            build_stats: BuildStatsEntry {
                proc_ms,
                compress_ratio,
                locales: manifest.locales.clone(),
            },
        }
    }

    fn file_name(&self) -> String {
        format!("{}-{}.json", self.bundle_version, self.build_id)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct BuildLogIndex {
    /// `bundle_version -> file name`.
    by_version: BTreeMap<String, String>,
    /// `build_id -> file name`.
    by_build_id: BTreeMap<String, String>,
}

pub struct BuildLogStore {
    root: PathBuf,
}

impl BuildLogStore {
    pub fn new(output_root: &Path) -> BuildLogStore {
        BuildLogStore { root: output_root.join(".quack").join("builds") }
    }

    fn bundle_dir(&self, bundle_name: &str) -> PathBuf {
        self.root.join(bundle_name)
    }

    fn index_path(&self, bundle_name: &str) -> PathBuf {
        self.bundle_dir(bundle_name).join("_index.json")
    }

    /// Appends a new build log and updates the secondary index. Existing log
    /// files are never rewritten; only the index gains a new pointer.
    pub fn append(&self, log: &BuildLog) -> Result<PathBuf, QuackError> {
        let dir = self.bundle_dir(&log.bundle_name);
        std::fs::create_dir_all(&dir).map_err(|e| QuackError::Io { source: e, path: dir.clone() })?;

        let file_name = log.file_name();
        let log_path = dir.join(&file_name);
        let json = serde_json::to_vec_pretty(log)?;
        std::fs::write(&log_path, &json).map_err(|e| QuackError::Io { source: e, path: log_path.clone() })?;

        let index_path = self.index_path(&log.bundle_name);
        let mut index = self.load_index(&log.bundle_name)?;
        index.by_version.insert(log.bundle_version.clone(), file_name.clone());
        index.by_build_id.insert(log.build_id.clone(), file_name);
        let index_json = serde_json::to_vec_pretty(&index)?;
        std::fs::write(&index_path, &index_json).map_err(|e| QuackError::Io { source: e, path: index_path })?;

        Ok(log_path)
    }

    fn load_index(&self, bundle_name: &str) -> Result<BuildLogIndex, QuackError> {
        let path = self.index_path(bundle_name);
        if !path.exists() {
            return Ok(BuildLogIndex::default());
        }
        let bytes = std::fs::read(&path).map_err(|e| QuackError::Io { source: e, path: path.clone() })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn by_version(&self, bundle_name: &str, version: &str) -> Result<Option<BuildLog>, QuackError> {
        let index = self.load_index(bundle_name)?;
        match index.by_version.get(version) {
            Some(file_name) => self.read_log(bundle_name, file_name).map(Some),
            None => Ok(None),
        }
    }

    pub fn by_build_id(&self, bundle_name: &str, build_id: &str) -> Result<Option<BuildLog>, QuackError> {
        let index = self.load_index(bundle_name)?;
        match index.by_build_id.get(build_id) {
            Some(file_name) => self.read_log(bundle_name, file_name).map(Some),
            None => Ok(None),
        }
    }

    /// All build logs for a bundle, newest first by `created_at`.
    pub fn list(&self, bundle_name: &str) -> Result<Vec<BuildLog>, QuackError> {
        let index = self.load_index(bundle_name)?;
        let mut logs: Vec<BuildLog> = index
            .by_build_id
            .values()
            .map(|file_name| self.read_log(bundle_name, file_name))
            .collect::<Result<_, _>>()?;
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(logs)
    }

    fn read_log(&self, bundle_name: &str, file_name: &str) -> Result<BuildLog, QuackError> {
        let path = self.bundle_dir(bundle_name).join(file_name);
        let bytes = std::fs::read(&path).map_err(|e| QuackError::Io { source: e, path: path.clone() })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Totals;

    fn sample_log(bundle: &str, version: &str, build_id: &str) -> BuildLog {
        BuildLog {
            bundle_name: bundle.to_string(),
            bundle_version: version.to_string(),
            build_id: build_id.to_string(),
            created_at: 100,
            bundle_path: PathBuf::from("out/main.qpk"),
            bundle_hash: "deadbeef".into(),
            totals: Totals { files: 1, size: 8 },
            assets: BTreeMap::new(),
            merkle_levels: vec![vec!["abc".into()]],
            merkle_root: "abc".into(),
            build_stats: BuildStatsEntry { proc_ms: 5, compress_ratio: 1.0, locales: vec!["default".into()] },
        }
    }

    #[test]
    fn append_and_lookup_by_version_and_build_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = BuildLogStore::new(dir.path());
        let log = sample_log("main", "1.0.0", "build-1");
        store.append(&log).unwrap();

        let by_version = store.by_version("main", "1.0.0").unwrap().unwrap();
        assert_eq!(by_version.build_id, "build-1");

        let by_build_id = store.by_build_id("main", "build-1").unwrap().unwrap();
        assert_eq!(by_build_id.bundle_version, "1.0.0");
    }

    #[test]
    fn missing_lookup_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = BuildLogStore::new(dir.path());
        assert!(store.by_version("main", "9.9.9").unwrap().is_none());
    }

    #[test]
    fn append_never_rewrites_prior_logs() {
        let dir = tempfile::tempdir().unwrap();
        let store = BuildLogStore::new(dir.path());
        store.append(&sample_log("main", "1.0.0", "build-1")).unwrap();
        store.append(&sample_log("main", "1.0.1", "build-2")).unwrap();

        assert!(store.by_version("main", "1.0.0").unwrap().is_some());
        assert!(store.by_version("main", "1.0.1").unwrap().is_some());
        assert_eq!(store.list("main").unwrap().len(), 2);
    }
}
