//! Manifest Builder: a pure function from a discovered asset set to the
//! per-bundle [`Manifest`] record (§3, §4.E).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::asset::{Asset, MediaTag};
use crate::compress::CompressionAlgo;
use crate::error::QuackError;
use crate::merkle::{build_tree, MerkleLeafInput, MerkleTree};

const MIN_MEMORY_ESTIMATE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionInfo {
    pub algo: String,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub enabled: bool,
    pub algo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub files: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerfEstimate {
    pub est_load_ms: f64,
    pub est_decompress_ms: f64,
    pub est_memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    pub bundle_name: String,
    pub display: Option<String>,
    pub priority: Option<i32>,
    pub deps: Vec<String>,
    pub load_trigger: Option<String>,
}

/// `AssetEntry` = `Asset` minus blob bytes, plus the storage coordinates the
/// Writer fills in once it knows where each payload block lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub relative_path: String,
    pub asset_type: String,
    pub sub_type: String,
    pub locales: Vec<String>,
    pub size: u64,
    pub content_hash: String,
    pub mtime: u64,
    pub version: String,
    pub media_tag: Option<MediaTag>,
    /// Populated by the Writer; `0` in a manifest that hasn't been written yet.
    pub offset: u64,
    pub stored_size: u64,
    pub stored_hash: String,
}

impl AssetEntry {
    pub fn from_asset(asset: &Asset) -> AssetEntry {
        AssetEntry {
            relative_path: asset.relative_path.clone(),
            asset_type: asset.asset_type.as_str().to_string(),
            sub_type: asset.sub_type.clone(),
            locales: asset.locales.clone(),
            size: asset.size,
            content_hash: asset.content_hash.clone(),
            mtime: asset.mtime,
            version: asset.version.clone(),
            media_tag: asset.media_tag.clone(),
            offset: 0,
            stored_size: 0,
            stored_hash: String::new(),
        }
    }

    /// The merkle leaf key: the locale this entry presents under. An entry
    /// with multiple locales is expanded into one leaf per locale by the
    /// caller before tree construction — `AssetEntry` itself stores the
    /// full `locales` list since that's what the manifest persists.
    pub fn primary_locale(&self) -> &str {
        self.locales.first().map(String::as_str).unwrap_or("default")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub bundle_version: String,
    pub build_id: String,
    pub created_at: u64,
    pub format_tag: String,
    pub compression: CompressionInfo,
    pub encryption: EncryptionInfo,
    pub locales: Vec<String>,
    pub default_locale: String,
    pub merkle_root: String,
    pub totals: Totals,
    /// `assets[type][relative_path] -> AssetEntry`.
    pub assets: BTreeMap<String, BTreeMap<String, AssetEntry>>,
    pub perf: Option<PerfEstimate>,
    pub workspace: Option<WorkspaceMeta>,
    /// Present only on a patch bundle's manifest (§4.L); absent on a
    /// regular bundle's manifest.
    pub patch: Option<crate::patch::PatchMeta>,
    #[serde(skip)]
    pub merkle_tree: Option<MerkleTree>,
}

#[derive(Debug, Clone)]
pub struct ManifestOptions {
    pub name: String,
    pub bundle_version: String,
    pub build_id: String,
    pub created_at: u64,
    pub default_locale: Option<String>,
    pub compression_algo: CompressionAlgo,
    pub compression_level: u32,
    pub encryption_enabled: bool,
    pub encryption_algo: Option<String>,
    pub include_perf: bool,
    pub workspace: Option<WorkspaceMeta>,
}

/// Validates `MAJOR.MINOR.PATCH[-pre]`. A hand-rolled parser — this single
/// fixed grammar doesn't earn a `semver` dependency the teacher never pulls in.
pub fn is_valid_semver(version: &str) -> bool {
    let (core, _pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Builds and validates the manifest for a discovered asset set. Pure:
/// no IO, no clock reads beyond what `options.created_at` already carries.
pub fn build_manifest(assets: &[Asset], options: &ManifestOptions) -> Result<Manifest, QuackError> {
    if assets.is_empty() {
        return Err(QuackError::Validation("no assets".into()));
    }
    build_manifest_inner(assets, options)
}

/// Builds a patch bundle's manifest. Unlike a regular bundle, an empty diff
/// is a valid no-op patch (§4.K) — a patch manifest with zero present
/// operations still gets serialized with matching pre/post Merkle roots.
pub fn build_patch_manifest(assets: &[Asset], options: &ManifestOptions) -> Result<Manifest, QuackError> {
    build_manifest_inner(assets, options)
}

fn build_manifest_inner(assets: &[Asset], options: &ManifestOptions) -> Result<Manifest, QuackError> {
    if !is_valid_semver(&options.bundle_version) {
        return Err(QuackError::Validation(format!(
            "bundle_version '{}' is not valid MAJOR.MINOR.PATCH[-pre]",
            options.bundle_version
        )));
    }

    let mut seen_keys = std::collections::HashSet::new();
    let mut all_locales = std::collections::BTreeSet::new();
    let mut locales_by_path: std::collections::HashMap<&str, &[String]> = std::collections::HashMap::new();
    let mut total_size: u64 = 0;

    for asset in assets {
        if !is_valid_semver(&asset.version) {
            return Err(QuackError::Validation(format!(
                "asset '{}' has invalid version '{}'",
                asset.relative_path, asset.version
            )));
        }
        for locale in &asset.locales {
            let key = (asset.relative_path.clone(), locale.clone());
            if !seen_keys.insert(key) {
                return Err(QuackError::Validation(format!(
                    "duplicate (path, locale) pair: ({}, {})",
                    asset.relative_path, locale
                )));
            }
            all_locales.insert(locale.clone());
        }
        total_size += asset.size;

        // One path can only ever resolve to one `AssetEntry` — the manifest
        // has no way to carry two distinct content blobs under one path, so
        // two asset records sharing a path must agree on the exact locale
        // set they cover (a path/content mismatch would otherwise silently
        // collapse to whichever record is inserted last).
        match locales_by_path.get(asset.relative_path.as_str()) {
            Some(prior_locales) if *prior_locales != asset.locales.as_slice() => {
                return Err(QuackError::Validation(format!(
                    "path '{}' is covered by two asset records with different locale sets ({:?} vs {:?})",
                    asset.relative_path, prior_locales, asset.locales
                )));
            }
            Some(_) => {}
            None => {
                locales_by_path.insert(asset.relative_path.as_str(), asset.locales.as_slice());
            }
        }
    }

    let default_locale = options.default_locale.clone().unwrap_or_else(|| "default".into());

    let mut assets_by_type: BTreeMap<String, BTreeMap<String, AssetEntry>> = BTreeMap::new();
    let mut leaf_records: Vec<(String, String, String)> = Vec::new();

    for asset in assets {
        let entry = AssetEntry::from_asset(asset);
        for locale in &asset.locales {
            leaf_records.push((asset.relative_path.clone(), locale.clone(), asset.content_hash.clone()));
        }
        assets_by_type
            .entry(asset.asset_type.as_str().to_string())
            .or_default()
            .insert(asset.relative_path.clone(), entry);
    }

    let leaves: Vec<MerkleLeafInput> = leaf_records
        .iter()
        .map(|(path, locale, hash)| MerkleLeafInput {
            relative_path: path,
            locale,
            content_hash: hash,
        })
        .collect();
    let merkle_tree = build_tree(leaves);
    let merkle_root = merkle_tree.root().to_string();

    let perf = if options.include_perf {
        Some(compute_perf_estimate(total_size, options.compression_algo))
    } else {
        None
    };

    Ok(Manifest {
        name: options.name.clone(),
        bundle_version: options.bundle_version.clone(),
        build_id: options.build_id.clone(),
        created_at: options.created_at,
        format_tag: "qpk".to_string(),
        compression: CompressionInfo {
            algo: options.compression_algo.name().to_string(),
            level: options.compression_level,
        },
        encryption: EncryptionInfo {
            enabled: options.encryption_enabled,
            algo: options.encryption_algo.clone(),
        },
        locales: all_locales.into_iter().collect(),
        default_locale,
        merkle_root,
        totals: Totals {
            files: assets.len() as u64,
            size: total_size,
        },
        assets: assets_by_type,
        perf,
        workspace: options.workspace.clone(),
        patch: None,
        merkle_tree: Some(merkle_tree),
    })
}

/// `spec.md` §4.E's perf formulae, mechanical and advisory-only — never
/// consulted by a codec decision.
pub fn compute_perf_estimate(total_size: u64, algo: CompressionAlgo) -> PerfEstimate {
    let size_mb = total_size as f64 / 1_000_000.0;
    let decompress_factor = match algo {
        CompressionAlgo::Lzma => 30.0,
        CompressionAlgo::Deflate => 10.0,
        CompressionAlgo::None => 0.0,
    };
    PerfEstimate {
        est_load_ms: size_mb * 10.0,
        est_decompress_ms: size_mb * decompress_factor,
        est_memory_bytes: total_size.max(MIN_MEMORY_ESTIMATE_BYTES),
    }
}
