//! QPK Writer: serializes `{header, index, payload blocks, manifest}`
//! atomically (§4.G).
//!
//! Grounded in the teacher's `archive::ArchiveWriter` shape — header struct,
//! `BufWriter`, index table, `NamedTempFile` + rename commit — rewritten to
//! the spec's fixed binary header instead of the teacher's JSON
//! header/footer pair, since the wire layout here has exact field offsets.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::asset::Asset;
use crate::cipher::{CipherContext, CipherPlugin};
use crate::compress::Compressor;
use crate::error::QuackError;
use crate::manifest::{build_manifest, Manifest, ManifestOptions};
use crate::qpk::{path_hash, FLAG_COMPRESSED, FLAG_ENCRYPTED, HEADER_SIZE, INDEX_ENTRY_SIZE, MAGIC};

pub struct QpkWriter;

impl QpkWriter {
    /// Builds the manifest, transforms every asset's bytes, and commits the
    /// whole container to `output` atomically. Returns the final manifest
    /// (with `offset`/`stored_size`/`stored_hash` populated).
    pub fn write(
        output: &Path,
        assets: &[(Asset, Vec<u8>)],
        options: &ManifestOptions,
        compressor: &dyn Compressor,
        cipher: &dyn CipherPlugin,
        bundle_name: &str,
    ) -> Result<Manifest, QuackError> {
        let asset_list: Vec<Asset> = assets.iter().map(|(a, _)| a.clone()).collect();
        let manifest = build_manifest(&asset_list, options)?;
        Self::write_prebuilt(output, assets, manifest, compressor, cipher, bundle_name)
    }

    /// As [`write`], but takes an already-built manifest rather than calling
    /// [`build_manifest`] internally — the Patch Writer uses this since
    /// [`build_patch_manifest`](crate::manifest::build_patch_manifest) allows
    /// an empty asset set (a no-op patch) that `build_manifest` rejects.
    pub fn write_prebuilt(
        output: &Path,
        assets: &[(Asset, Vec<u8>)],
        mut manifest: Manifest,
        compressor: &dyn Compressor,
        cipher: &dyn CipherPlugin,
        bundle_name: &str,
    ) -> Result<Manifest, QuackError> {
        let compression_level = manifest.compression.level;
        let compression_applied = !matches!(compressor.algo(), crate::compress::CompressionAlgo::None);
        let encryption_applied = manifest.encryption.enabled;
        let mut flags = 0u32;
        if compression_applied {
            flags |= FLAG_COMPRESSED;
        }
        if encryption_applied {
            flags |= FLAG_ENCRYPTED;
        }

        // Pass 1: transform every asset's bytes and assign sequential offsets,
        // in the same (type, relative_path) order the manifest's BTreeMaps
        // already iterate in — this is what makes payload placement
        // deterministic across two builds of an identical asset set.
        let file_count = manifest
            .assets
            .values()
            .flat_map(|m| m.values())
            .map(|e| e.locales.len() as u32)
            .sum::<u32>();
        let payload_offset = HEADER_SIZE + file_count as u64 * INDEX_ENTRY_SIZE;

        let mut cursor = payload_offset;
        let mut payload_blocks: Vec<Vec<u8>> = Vec::new();
        let mut index_rows: Vec<(Vec<u8>, u64, u64, u64, u32)> = Vec::new();

        for (type_key, by_path) in manifest.assets.iter_mut() {
            for (path_key, entry) in by_path.iter_mut() {
                let mut matches = assets.iter().filter(|(a, _)| &a.relative_path == path_key && a.asset_type.as_str() == type_key);
                let (asset, raw_bytes) = matches
                    .next()
                    .ok_or_else(|| QuackError::Integrity(format!("asset '{path_key}' missing from input set")))?;
                if matches.next().is_some() {
                    // `build_manifest` rejects two records sharing a path with
                    // different locale sets, so this would mean the manifest
                    // passed in bypassed that check (`build_patch_manifest`'s
                    // caller built it some other way) — refuse to guess which
                    // record's bytes belong under `entry`.
                    return Err(QuackError::Integrity(format!(
                        "asset '{path_key}' matches more than one input record; cannot determine which bytes to store"
                    )));
                }

                let compressed = compressor.encode(raw_bytes, compression_level)?;
                let ctx = CipherContext {
                    asset_path: &asset.relative_path,
                    asset_type: type_key,
                    bundle_name,
                };
                let stored = if encryption_applied {
                    cipher.encrypt(&compressed, &ctx)?
                } else {
                    compressed
                };

                entry.offset = cursor;
                entry.stored_size = stored.len() as u64;
                entry.stored_hash = crate::hash::hash_bytes_hex(&stored);

                for locale in &entry.locales {
                    index_rows.push((
                        path_hash(path_key, locale).to_vec(),
                        entry.offset,
                        entry.stored_size,
                        entry.size,
                        flags,
                    ));
                }

                cursor += stored.len() as u64;
                payload_blocks.push(stored);
            }
        }

        index_rows.sort_by(|a, b| a.0.cmp(&b.0));

        // Confirm no two distinct (path, locale) pairs collided on path_hash
        // truncated to 16 bytes — astronomically unlikely, but the Writer
        // must not silently emit a broken index if it ever happens.
        let mut seen: BTreeSet<Vec<u8>> = BTreeSet::new();
        for (h, ..) in &index_rows {
            if !seen.insert(h.clone()) {
                return Err(QuackError::Integrity(
                    "path_hash collision across distinct (path, locale) pairs".into(),
                ));
            }
        }

        let manifest_offset = cursor;

        // The manifest's own `merkle_tree` field is process-internal
        // bookkeeping, never serialized (`#[serde(skip)]`); strip it before
        // computing `manifest_raw_size` so the on-disk text matches what the
        // Reader will parse back.
        let manifest_json = serde_json::to_vec(&manifest)?;
        let manifest_raw_size = manifest_json.len() as u64;
        let manifest_compressed = compressor.encode(&manifest_json, compression_level)?;
        let manifest_ctx = CipherContext {
            asset_path: "__manifest__",
            asset_type: "__manifest__",
            bundle_name,
        };
        let manifest_stored = if encryption_applied {
            cipher.encrypt(&manifest_compressed, &manifest_ctx)?
        } else {
            manifest_compressed
        };
        let manifest_stored_size = manifest_stored.len() as u64;

        let mut tmp = NamedTempFile::new_in(output.parent().unwrap_or_else(|| Path::new(".")))
            .map_err(|e| QuackError::Io { source: e, path: output.to_path_buf() })?;

        // Header `encryption_flags`: bit 0 enabled, bits 1-7 algorithm tag —
        // a different bit layout from the per-index-row `flags` above.
        let header_encryption_flags = (encryption_applied as u32) | ((cipher.algo_tag().to_bits() as u32) << 1);

        write_header(
            tmp.as_file_mut(),
            file_count,
            compressor.algo().to_u32(),
            header_encryption_flags,
            manifest_offset,
            manifest_stored_size,
            manifest_raw_size,
            payload_offset,
        )?;

        for (hash, offset, stored_size, raw_size, row_flags) in &index_rows {
            write_index_entry(tmp.as_file_mut(), hash, *offset, *stored_size, *raw_size, *row_flags)?;
        }

        for block in &payload_blocks {
            tmp.as_file_mut().write_all(block).map_err(|e| QuackError::Io {
                source: e,
                path: output.to_path_buf(),
            })?;
        }

        tmp.as_file_mut().write_all(&manifest_stored).map_err(|e| QuackError::Io {
            source: e,
            path: output.to_path_buf(),
        })?;

        tmp.as_file_mut().sync_all().map_err(|e| QuackError::Io {
            source: e,
            path: output.to_path_buf(),
        })?;

        tmp.persist(output).map_err(|e| QuackError::Io {
            source: e.error,
            path: output.to_path_buf(),
        })?;

        Ok(manifest)
    }
}

fn write_header(
    file: &mut std::fs::File,
    file_count: u32,
    compression_algo: u32,
    encryption_flags: u32,
    manifest_offset: u64,
    manifest_stored_size: u64,
    manifest_raw_size: u64,
    payload_offset: u64,
) -> Result<(), QuackError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&crate::qpk::FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&compression_algo.to_le_bytes());
    buf.extend_from_slice(&encryption_flags.to_le_bytes());
    buf.extend_from_slice(&file_count.to_le_bytes());
    buf.extend_from_slice(&manifest_offset.to_le_bytes());
    buf.extend_from_slice(&manifest_stored_size.to_le_bytes());
    buf.extend_from_slice(&manifest_raw_size.to_le_bytes());
    buf.extend_from_slice(&payload_offset.to_le_bytes());
    buf.extend_from_slice(&[0u8; 16]);
    debug_assert_eq!(buf.len() as u64, HEADER_SIZE);
    file.write_all(&buf).map_err(|e| QuackError::Io {
        source: e,
        path: std::path::PathBuf::new(),
    })
}

fn write_index_entry(
    file: &mut std::fs::File,
    path_hash: &[u8],
    offset: u64,
    stored_size: u64,
    raw_size: u64,
    flags: u32,
) -> Result<(), QuackError> {
    let mut buf = Vec::with_capacity(INDEX_ENTRY_SIZE as usize);
    buf.extend_from_slice(path_hash);
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&stored_size.to_le_bytes());
    buf.extend_from_slice(&raw_size.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    debug_assert_eq!(buf.len() as u64, INDEX_ENTRY_SIZE);
    file.write_all(&buf).map_err(|e| QuackError::Io {
        source: e,
        path: std::path::PathBuf::new(),
    })
}
