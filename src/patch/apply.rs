//! Patch Applicator: shadow-copy-then-commit state machine (§4.M).
//!
//! `apply_patch` never mutates the `BundleState` it's given — on success it
//! returns a new, committed state; on any precondition/conflict/postcondition
//! failure it returns an error and the caller's state is untouched. That's
//! what "apply to a shadow copy, commit at the end" means here: there is no
//! in-place mutation to roll back.

use std::collections::HashMap;

use crate::error::QuackError;
use crate::manifest::{AssetEntry, Manifest};
use crate::merkle::{build_tree, MerkleLeafInput};
use crate::patch::OpKind;
use crate::qpk::reader::{QpkHandle, QpkReader};
use crate::{cipher::CipherPlugin, compress::Compressor};

/// A loaded bundle's state: its declared version and every `(path, locale)`
/// entry reachable with its payload bytes, as the spec's `BundleState`
/// (manifest + payload blobs reachable by `(path, locale)`).
#[derive(Debug, Clone, Default)]
pub struct BundleState {
    pub current_version: String,
    pub entries: HashMap<(String, String), (AssetEntry, Vec<u8>)>,
}

impl BundleState {
    pub fn new(current_version: impl Into<String>) -> BundleState {
        BundleState { current_version: current_version.into(), entries: HashMap::new() }
    }

    pub fn from_manifest(manifest: &Manifest, payloads: HashMap<(String, String), Vec<u8>>) -> BundleState {
        let mut entries = HashMap::new();
        for by_path in manifest.assets.values() {
            for (path, entry) in by_path {
                for locale in &entry.locales {
                    let key = (path.clone(), locale.clone());
                    if let Some(bytes) = payloads.get(&key) {
                        entries.insert(key, (entry.clone(), bytes.clone()));
                    }
                }
            }
        }
        BundleState { current_version: manifest.bundle_version.clone(), entries }
    }

    /// Recomputes the Merkle root over the current entry set — this is the
    /// same tree construction the Manifest Builder uses, so a `BundleState`
    /// built from a manifest reproduces that manifest's `merkle_root`.
    pub fn merkle_root(&self) -> String {
        let leaves: Vec<MerkleLeafInput> = self
            .entries
            .iter()
            .map(|((path, locale), (entry, _))| MerkleLeafInput {
                relative_path: path,
                locale,
                content_hash: &entry.content_hash,
            })
            .collect();
        build_tree(leaves).root().to_string()
    }
}

/// Applies one patch to `state`. On success, returns the new, committed
/// state with `current_version` advanced to `patch.to_version`. On any
/// failure, `state` itself was never touched — the caller simply discards
/// the `Err` and keeps using what it already had.
#[allow(clippy::too_many_arguments)]
pub fn apply_patch(
    state: &BundleState,
    manifest: &Manifest,
    handle: &mut QpkHandle,
    compressor: &dyn Compressor,
    cipher: &dyn CipherPlugin,
    bundle_name: &str,
) -> Result<BundleState, QuackError> {
    let patch = manifest
        .patch
        .as_ref()
        .ok_or_else(|| QuackError::Validation("manifest carries no patch metadata".into()))?;

    if state.current_version != patch.from_version {
        return Err(QuackError::VersionMismatch {
            expected: patch.from_version.clone(),
            actual: state.current_version.clone(),
        });
    }
    if state.merkle_root() != patch.from_merkle_root {
        return Err(QuackError::RootMismatch);
    }

    let mut shadow = state.entries.clone();
    let mut ops = patch.operations.clone();
    ops.sort_by(|a, b| a.path.cmp(&b.path));

    for op in &ops {
        let key = (op.path.clone(), op.locale.clone());
        match op.kind {
            OpKind::Delete => {
                if shadow.remove(&key).is_none() {
                    return Err(QuackError::OperationConflict(format!(
                        "delete target ({}, {}) is not present",
                        op.path, op.locale
                    )));
                }
            }
            OpKind::Add => {
                if shadow.contains_key(&key) {
                    return Err(QuackError::OperationConflict(format!(
                        "add target ({}, {}) already present",
                        op.path, op.locale
                    )));
                }
                let entry = lookup_entry(manifest, &op.path)?;
                let bytes = QpkReader::extract(handle, manifest, &op.path, &op.locale, compressor, cipher, bundle_name)?;
                shadow.insert(key, (entry, bytes));
            }
            OpKind::Modify => {
                if !shadow.contains_key(&key) {
                    return Err(QuackError::OperationConflict(format!(
                        "modify target ({}, {}) is not present",
                        op.path, op.locale
                    )));
                }
                let entry = lookup_entry(manifest, &op.path)?;
                let bytes = QpkReader::extract(handle, manifest, &op.path, &op.locale, compressor, cipher, bundle_name)?;
                shadow.insert(key, (entry, bytes));
            }
        }
    }

    let shadow_state = BundleState { current_version: patch.to_version.clone(), entries: shadow };
    if shadow_state.merkle_root() != patch.to_merkle_root {
        return Err(QuackError::PatchCorrupt);
    }

    Ok(shadow_state)
}

fn lookup_entry(manifest: &Manifest, path: &str) -> Result<AssetEntry, QuackError> {
    manifest
        .assets
        .values()
        .find_map(|by_path| by_path.get(path))
        .cloned()
        .ok_or_else(|| QuackError::Validation(format!("'{path}' not present in patch manifest")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, AssetType};
    use crate::cipher::NoneCipher;
    use crate::compress::{compressor_for, CompressionAlgo};
    use crate::diff::{DeletedEntry, Diff, ModifiedEntry};
    use crate::manifest::ManifestOptions;
    use crate::patch::writer::PatchWriter;

    fn opts(version: &str, build_id: &str) -> ManifestOptions {
        ManifestOptions {
            name: "main".into(),
            bundle_version: version.into(),
            build_id: build_id.into(),
            created_at: 0,
            default_locale: None,
            compression_algo: CompressionAlgo::None,
            compression_level: 0,
            encryption_enabled: false,
            encryption_algo: None,
            include_perf: false,
            workspace: None,
        }
    }

    fn asset(path: &str, bytes: &[u8], version: &str) -> Asset {
        Asset::from_bytes(path, AssetType::Data, "config", vec!["default".into()], bytes, 0, version, None).unwrap()
    }

    fn root_of(entries: &[(&str, &str)]) -> String {
        let leaves: Vec<MerkleLeafInput> = entries
            .iter()
            .map(|(path, hash)| MerkleLeafInput { relative_path: path, locale: "default", content_hash: hash })
            .collect();
        build_tree(leaves).root().to_string()
    }

    #[test]
    fn scenario_s5_add_modify_delete_advances_state_to_bs_root() {
        let x = asset("data/x.json", b"x-v1", "1.0.0");
        let y_old_hash = x.content_hash.clone(); // placeholder, unused
        let _ = y_old_hash;
        let y = asset("data/y.json", b"y-v1", "1.0.0");

        let mut entries = HashMap::new();
        entries.insert(
            ("data/x.json".to_string(), "default".to_string()),
            (AssetEntry::from_asset(&x), b"x-v1".to_vec()),
        );
        entries.insert(
            ("data/y.json".to_string(), "default".to_string()),
            (AssetEntry::from_asset(&y), b"y-v1".to_vec()),
        );
        let state_a = BundleState { current_version: "1.0.0".into(), entries };
        let root_a = root_of(&[("data/x.json", &x.content_hash), ("data/y.json", &y.content_hash)]);
        assert_eq!(state_a.merkle_root(), root_a);

        let y_v2 = asset("data/y.json", b"y-v2", "1.0.1");
        let z = asset("data/z.json", b"z-v1", "1.0.1");
        let root_b = root_of(&[("data/y.json", &y_v2.content_hash), ("data/z.json", &z.content_hash)]);

        let diff = Diff {
            added: vec![("data/z.json".to_string(), crate::buildlog::AssetLogEntry {
                hash: z.content_hash.clone(),
                size: z.size,
                version: "1.0.1".into(),
                mtime: 0,
                primary_locale: "default".into(),
            })],
            modified: vec![ModifiedEntry {
                path: "data/y.json".into(),
                old_hash: y.content_hash.clone(),
                new_hash: y_v2.content_hash.clone(),
                locale: "default".into(),
            }],
            deleted: vec![DeletedEntry { path: "data/x.json".into(), locale: "default".into() }],
        };

        let dir = tempfile::tempdir().unwrap();
        let patch_path = dir.path().join("patch.qpk");
        let compressor = compressor_for(CompressionAlgo::None);
        let cipher = NoneCipher;
        PatchWriter::write(
            &patch_path,
            &diff,
            &[(z.clone(), b"z-v1".to_vec()), (y_v2.clone(), b"y-v2".to_vec())],
            &opts("1.0.1", "build-2"),
            "1.0.0",
            "1.0.1",
            &root_a,
            &root_b,
            compressor.as_ref(),
            &cipher,
            "main",
        )
        .unwrap();

        let mut handle = crate::patch::reader::PatchReader::open(&patch_path).unwrap();
        let manifest = crate::patch::reader::PatchReader::manifest(&mut handle, compressor.as_ref(), &cipher, "main").unwrap();

        let state_b = apply_patch(&state_a, &manifest, &mut handle, compressor.as_ref(), &cipher, "main").unwrap();
        assert_eq!(state_b.current_version, "1.0.1");
        assert_eq!(state_b.merkle_root(), root_b);
        assert!(!state_b.entries.contains_key(&("data/x.json".to_string(), "default".to_string())));
        assert!(state_b.entries.contains_key(&("data/z.json".to_string(), "default".to_string())));

        // The original state is untouched.
        assert_eq!(state_a.current_version, "1.0.0");
        assert_eq!(state_a.merkle_root(), root_a);
    }

    #[test]
    fn scenario_s6_version_mismatch_leaves_state_unchanged() {
        let state = BundleState::new("2");
        let manifest = Manifest {
            name: "main".into(),
            bundle_version: "3".into(),
            build_id: "b".into(),
            created_at: 0,
            format_tag: "qpk".into(),
            compression: crate::manifest::CompressionInfo { algo: "none".into(), level: 0 },
            encryption: crate::manifest::EncryptionInfo { enabled: false, algo: None },
            locales: vec!["default".into()],
            default_locale: "default".into(),
            merkle_root: String::new(),
            totals: crate::manifest::Totals { files: 0, size: 0 },
            assets: Default::default(),
            perf: None,
            workspace: None,
            patch: Some(crate::patch::PatchMeta {
                from_version: "3".into(),
                to_version: "4".into(),
                from_merkle_root: "whatever".into(),
                to_merkle_root: "whatever-else".into(),
                operations: vec![],
            }),
            merkle_tree: None,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unused.qpk");
        let compressor = compressor_for(CompressionAlgo::None);
        let cipher = NoneCipher;
        // Write a throwaway file just so `open` has something to parse; its
        // content is irrelevant since VersionMismatch is raised before any read.
        crate::qpk::writer::QpkWriter::write(
            &path,
            &[(asset("data/a.json", b"a", "1.0.0"), b"a".to_vec())],
            &opts("1.0.0", "b1"),
            compressor.as_ref(),
            &cipher,
            "main",
        )
        .unwrap();
        let mut handle = crate::qpk::reader::QpkReader::open(&path).unwrap();

        let err = apply_patch(&state, &manifest, &mut handle, compressor.as_ref(), &cipher, "main").unwrap_err();
        assert_eq!(err.kind_tag(), "version-mismatch");
        assert_eq!(state.current_version, "2");
    }
}
