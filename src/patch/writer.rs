//! Patch Writer: turns a [`Diff`] plus the new build's assets into a patch
//! QPK (§4.L).
//!
//! Reuses [`QpkWriter::write_prebuilt`] for the actual on-disk layout —
//! only the manifest construction differs from a regular bundle: the asset
//! set is restricted to `Add`/`Modify` payloads, built via
//! [`build_patch_manifest`] so an empty diff still serializes (a valid
//! no-op patch), and the `patch` field carries the operation list plus the
//! pre/post Merkle roots.

use std::path::Path;

use crate::asset::Asset;
use crate::cipher::CipherPlugin;
use crate::compress::Compressor;
use crate::diff::Diff;
use crate::error::QuackError;
use crate::manifest::{build_patch_manifest, Manifest, ManifestOptions};
use crate::patch::{Op, OpKind, PatchMeta};
use crate::qpk::writer::QpkWriter;

pub struct PatchWriter;

impl PatchWriter {
    /// `new_assets` must contain an `(Asset, bytes)` pair for every path the
    /// diff reports as `added` or `modified` — `deleted` paths carry no
    /// payload and need no entry.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        output: &Path,
        diff: &Diff,
        new_assets: &[(Asset, Vec<u8>)],
        options: &ManifestOptions,
        from_version: &str,
        to_version: &str,
        from_merkle_root: &str,
        to_merkle_root: &str,
        compressor: &dyn Compressor,
        cipher: &dyn CipherPlugin,
        bundle_name: &str,
    ) -> Result<Manifest, QuackError> {
        let mut operations = Vec::new();
        let mut payload_assets: Vec<(Asset, Vec<u8>)> = Vec::new();

        for (path, entry) in &diff.added {
            operations.push(Op {
                kind: OpKind::Add,
                path: path.clone(),
                locale: entry.primary_locale.clone(),
            });
            payload_assets.push(find_asset(new_assets, path)?);
        }

        for modified in &diff.modified {
            operations.push(Op {
                kind: OpKind::Modify,
                path: modified.path.clone(),
                locale: modified.locale.clone(),
            });
            payload_assets.push(find_asset(new_assets, &modified.path)?);
        }

        for deleted in &diff.deleted {
            operations.push(Op {
                kind: OpKind::Delete,
                path: deleted.path.clone(),
                locale: deleted.locale.clone(),
            });
        }

        operations.sort_by(|a, b| a.path.cmp(&b.path));

        let asset_list: Vec<Asset> = payload_assets.iter().map(|(a, _)| a.clone()).collect();
        let mut manifest = build_patch_manifest(&asset_list, options)?;
        manifest.patch = Some(PatchMeta {
            from_version: from_version.to_string(),
            to_version: to_version.to_string(),
            from_merkle_root: from_merkle_root.to_string(),
            to_merkle_root: to_merkle_root.to_string(),
            operations,
        });

        QpkWriter::write_prebuilt(output, &payload_assets, manifest, compressor, cipher, bundle_name)
    }
}

fn find_asset(new_assets: &[(Asset, Vec<u8>)], path: &str) -> Result<(Asset, Vec<u8>), QuackError> {
    new_assets
        .iter()
        .find(|(a, _)| a.relative_path == path)
        .cloned()
        .ok_or_else(|| QuackError::Validation(format!("asset '{path}' missing from new build's payload set")))
}
