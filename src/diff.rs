//! Diff Engine: the minimal `{added, modified, deleted}` set between two
//! build logs, keyed by `relative_path` (§4.K).

use serde::{Deserialize, Serialize};

use crate::buildlog::{AssetLogEntry, BuildLog};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedEntry {
    pub path: String,
    pub old_hash: String,
    pub new_hash: String,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedEntry {
    pub path: String,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub added: Vec<(String, AssetLogEntry)>,
    pub modified: Vec<ModifiedEntry>,
    pub deleted: Vec<DeletedEntry>,
}

impl Diff {
    pub fn change_count(&self) -> u64 {
        (self.added.len() + self.modified.len() + self.deleted.len()) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Computes `Diff(old, new)`. A path present in both logs whose hash differs
/// is `modified`; a path present in `new` only is `added`; a path present in
/// `old` only is `deleted`. Output is ordered by `relative_path` ASCII.
pub fn diff_build_logs(old: &BuildLog, new: &BuildLog) -> Diff {
    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for (path, new_entry) in &new.assets {
        match old.assets.get(path) {
            None => added.push((path.clone(), new_entry.clone())),
            Some(old_entry) if old_entry.hash != new_entry.hash => modified.push(ModifiedEntry {
                path: path.clone(),
                old_hash: old_entry.hash.clone(),
                new_hash: new_entry.hash.clone(),
                locale: new_entry.primary_locale.clone(),
            }),
            Some(_) => {}
        }
    }

    for (path, old_entry) in &old.assets {
        if !new.assets.contains_key(path) {
            deleted.push(DeletedEntry { path: path.clone(), locale: old_entry.primary_locale.clone() });
        }
    }

    added.sort_by(|a, b| a.0.cmp(&b.0));
    modified.sort_by(|a, b| a.path.cmp(&b.path));
    deleted.sort_by(|a, b| a.path.cmp(&b.path));

    Diff { added, modified, deleted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Totals;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn log_with(assets: &[(&str, &str)]) -> BuildLog {
        let mut map = BTreeMap::new();
        for (path, hash) in assets {
            map.insert(
                path.to_string(),
                AssetLogEntry { hash: hash.to_string(), size: 1, version: "1.0.0".into(), mtime: 0, primary_locale: "default".into() },
            );
        }
        BuildLog {
            bundle_name: "main".into(),
            bundle_version: "1.0.0".into(),
            build_id: "b".into(),
            created_at: 0,
            bundle_path: PathBuf::from("out.qpk"),
            bundle_hash: "x".into(),
            totals: Totals { files: assets.len() as u64, size: assets.len() as u64 },
            assets: map,
            merkle_levels: vec![],
            merkle_root: String::new(),
            build_stats: crate::buildlog::BuildStatsEntry { proc_ms: 0, compress_ratio: 1.0, locales: vec![] },
        }
    }

    #[test]
    fn scenario_s5_add_modify_delete() {
        let a = log_with(&[("x", "h1"), ("y", "h2")]);
        let b = log_with(&[("y", "h2prime"), ("z", "h3")]);
        let diff = diff_build_logs(&a, &b);

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].0, "z");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].path, "y");
        assert_eq!(diff.modified[0].old_hash, "h2");
        assert_eq!(diff.modified[0].new_hash, "h2prime");
        assert_eq!(diff.deleted.len(), 1);
        assert_eq!(diff.deleted[0].path, "x");
        assert_eq!(diff.deleted[0].locale, "default");
    }

    #[test]
    fn identical_logs_yield_empty_diff() {
        let a = log_with(&[("x", "h1")]);
        let diff = diff_build_logs(&a, &a.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn output_ordered_by_path_ascii() {
        let a = log_with(&[]);
        let b = log_with(&[("z", "h"), ("a", "h"), ("m", "h")]);
        let diff = diff_build_logs(&a, &b);
        let paths: Vec<_> = diff.added.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths, vec!["a".to_string(), "m".to_string(), "z".to_string()]);
    }
}
