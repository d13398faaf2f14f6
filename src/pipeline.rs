//! High-level operations the CLI verbs drive: the producer path (discover →
//! manifest → write → build log), the consumer path (open → extract/verify),
//! and the patch path (diff → patch write → patch apply). Everything here is
//! a thin composition of the lower-level modules — no new wire format or
//! state shape is introduced.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::asset::{Asset, AssetDiscoverer};
use crate::buildlog::{BuildLog, BuildLogStore};
use crate::cipher::{CipherPlugin, NoneCipher, XorCipher};
use crate::compress::{compressor_for, Compressor};
use crate::config::BuildContext;
use crate::discover::FsAssetDiscoverer;
use crate::error::QuackError;
use crate::manifest::{Manifest, ManifestOptions};
use crate::patch::apply::{apply_patch, BundleState};
use crate::patch::reader::PatchReader;
use crate::patch::writer::PatchWriter;
use crate::qpk::reader::QpkReader;
use crate::qpk::writer::QpkWriter;
use crate::workspace::{BuildSummary, BundleDefinition, BundleIndex, PatchSummary, WorkspaceIndex, WorkspaceIndexStore};

fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Builds the cipher the rest of a pipeline call uses: `XorCipher` keyed
/// from `ctx.encryption_key` when encryption is enabled, `NoneCipher`
/// otherwise. `xor` is the one built-in keyed cipher the format mandates;
/// a caller wanting `AesGcmCipher` constructs one directly and bypasses
/// this helper.
fn make_cipher(ctx: &BuildContext) -> Box<dyn CipherPlugin> {
    if ctx.encryption_enabled {
        Box::new(XorCipher::new(ctx.encryption_key.clone().unwrap_or_default()))
    } else {
        Box::new(NoneCipher)
    }
}

pub struct BundleResult {
    pub manifest: Manifest,
    pub bundle_path: PathBuf,
    pub build_log: BuildLog,
}

/// The producer path: discover assets under `source`, build the manifest,
/// write the QPK, and append a build log entry for it (§3's control flow
/// up to the Build Log Store).
#[allow(clippy::too_many_arguments)]
pub fn bundle(
    ctx: &BuildContext,
    source: &Path,
    output: &Path,
    name: &str,
    bundle_version: &str,
    build_id: &str,
) -> Result<BundleResult, QuackError> {
    let discoverer = FsAssetDiscoverer::new(bundle_version);
    let discovered = discoverer.discover(source, &ctx.ignore_globs)?;

    let options = ManifestOptions {
        name: name.to_string(),
        bundle_version: bundle_version.to_string(),
        build_id: build_id.to_string(),
        created_at: now_epoch_secs(),
        default_locale: None,
        compression_algo: ctx.compression_algo,
        compression_level: ctx.compression_level,
        encryption_enabled: ctx.encryption_enabled,
        encryption_algo: ctx.encryption_algo.clone(),
        include_perf: true,
        workspace: None,
    };

    let compressor = compressor_for(ctx.compression_algo);
    let cipher = make_cipher(ctx);

    let manifest = QpkWriter::write(output, &discovered, &options, compressor.as_ref(), cipher.as_ref(), name)?;

    let bundle_bytes = std::fs::read(output).map_err(|e| QuackError::Io { source: e, path: output.to_path_buf() })?;
    let merkle_tree = manifest
        .merkle_tree
        .clone()
        .ok_or_else(|| QuackError::Integrity("manifest carries no merkle tree at build time".into()))?;
    let build_log = BuildLog::from_manifest(&manifest, output, &bundle_bytes, &merkle_tree, options.created_at, 0);

    Ok(BundleResult { manifest, bundle_path: output.to_path_buf(), build_log })
}

/// Builds a bundle and records it into both the Build Log Store and the
/// Workspace Index in one call — what the `workspace bundle` CLI verb uses.
pub fn bundle_into_workspace(
    ctx: &BuildContext,
    workspace_root: &Path,
    bundle_name: &str,
    source: &Path,
    output: &Path,
    bundle_version: &str,
    build_id: &str,
    definition: BundleDefinition,
) -> Result<BundleResult, QuackError> {
    let result = bundle(ctx, source, output, bundle_name, bundle_version, build_id)?;

    let log_store = BuildLogStore::new(workspace_root);
    log_store.append(&result.build_log)?;

    let index_store = WorkspaceIndexStore::new(workspace_root);
    let summary = BuildSummary {
        build_id: build_id.to_string(),
        bundle_path: result.bundle_path.clone(),
        bundle_hash: result.build_log.bundle_hash.clone(),
        created_at: result.build_log.created_at,
        merkle_root: result.build_log.merkle_root.clone(),
    };
    let bundle_name_owned = bundle_name.to_string();
    let bundle_version_owned = bundle_version.to_string();
    index_store.update(
        || WorkspaceIndex::new(bundle_name.to_string()),
        move |index| {
            index.current_version += 1;
            let entry = index.bundles.entry(bundle_name_owned.clone()).or_insert_with(|| BundleIndex {
                name: bundle_name_owned.clone(),
                current_version: bundle_version_owned.clone(),
                latest: summary.clone(),
                previous: Vec::new(),
                patches: Vec::new(),
                definition: definition.clone(),
            });
            if entry.current_version != bundle_version_owned {
                entry.previous.push(entry.latest.clone());
            }
            entry.current_version = bundle_version_owned.clone();
            entry.latest = summary.clone();
            Ok(())
        },
    )?;

    Ok(result)
}

/// The consumer path's `list`/`version-info` support: open a bundle and
/// read back its manifest without extracting anything.
pub fn read_manifest(archive: &Path, ctx: &BuildContext, bundle_name: &str) -> Result<Manifest, QuackError> {
    let compressor = compressor_for(ctx.compression_algo);
    let cipher = make_cipher(ctx);
    let mut handle = QpkReader::open(archive)?;
    QpkReader::manifest(&mut handle, compressor.as_ref(), cipher.as_ref(), bundle_name)
}

/// `verify`: reads every asset back and lets the Reader's content-hash
/// check surface any integrity error. Returns the count of assets checked.
pub fn verify(archive: &Path, ctx: &BuildContext, bundle_name: &str) -> Result<u64, QuackError> {
    let compressor = compressor_for(ctx.compression_algo);
    let cipher = make_cipher(ctx);
    let mut handle = QpkReader::open(archive)?;
    let manifest = QpkReader::manifest(&mut handle, compressor.as_ref(), cipher.as_ref(), bundle_name)?;

    let mut checked = 0u64;
    for by_path in manifest.assets.values() {
        for (path, entry) in by_path {
            for locale in &entry.locales {
                QpkReader::extract(&mut handle, &manifest, path, locale, compressor.as_ref(), cipher.as_ref(), bundle_name)?;
                checked += 1;
            }
        }
    }
    Ok(checked)
}

/// `extract`: writes one asset's plaintext bytes to `destination`.
pub fn extract_one(
    archive: &Path,
    relative_path: &str,
    locale: &str,
    destination: &Path,
    ctx: &BuildContext,
    bundle_name: &str,
) -> Result<(), QuackError> {
    let compressor = compressor_for(ctx.compression_algo);
    let cipher = make_cipher(ctx);
    let mut handle = QpkReader::open(archive)?;
    let manifest = QpkReader::manifest(&mut handle, compressor.as_ref(), cipher.as_ref(), bundle_name)?;
    let bytes = QpkReader::extract(&mut handle, &manifest, relative_path, locale, compressor.as_ref(), cipher.as_ref(), bundle_name)?;
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| QuackError::Io { source: e, path: parent.to_path_buf() })?;
    }
    std::fs::write(destination, &bytes).map_err(|e| QuackError::Io { source: e, path: destination.to_path_buf() })
}

/// The patch path: diffs `old_log` against `new_log`, re-discovers
/// `new_source`'s assets to source `Add`/`Modify` payloads, and writes the
/// patch QPK.
#[allow(clippy::too_many_arguments)]
pub fn patch_create(
    ctx: &BuildContext,
    old_log: &BuildLog,
    new_log: &BuildLog,
    new_source: &Path,
    output: &Path,
    bundle_name: &str,
) -> Result<Manifest, QuackError> {
    let diff = crate::diff::diff_build_logs(old_log, new_log);

    let discoverer = FsAssetDiscoverer::new(new_log.bundle_version.clone());
    let new_assets: Vec<(Asset, Vec<u8>)> = discoverer.discover(new_source, &ctx.ignore_globs)?;

    let options = ManifestOptions {
        name: bundle_name.to_string(),
        bundle_version: new_log.bundle_version.clone(),
        build_id: new_log.build_id.clone(),
        created_at: now_epoch_secs(),
        default_locale: None,
        compression_algo: ctx.compression_algo,
        compression_level: ctx.compression_level,
        encryption_enabled: ctx.encryption_enabled,
        encryption_algo: ctx.encryption_algo.clone(),
        include_perf: false,
        workspace: None,
    };

    let compressor = compressor_for(ctx.compression_algo);
    let cipher = make_cipher(ctx);

    PatchWriter::write(
        output,
        &diff,
        &new_assets,
        &options,
        &old_log.bundle_version,
        &new_log.bundle_version,
        &old_log.merkle_root,
        &new_log.merkle_root,
        compressor.as_ref(),
        cipher.as_ref(),
        bundle_name,
    )
}

/// The patch path's other end: apply a patch file to an in-memory bundle
/// state (§4.M). `payload_source` supplies the plaintext bytes of every
/// `(path, locale)` the caller's current state already holds, so `state`
/// can be reconstructed from a prior bundle's manifest plus extracted
/// payloads.
pub fn patch_apply(
    ctx: &BuildContext,
    state: &BundleState,
    patch_path: &Path,
    bundle_name: &str,
) -> Result<BundleState, QuackError> {
    let compressor = compressor_for(ctx.compression_algo);
    let cipher = make_cipher(ctx);
    let mut handle = PatchReader::open(patch_path)?;
    let manifest = PatchReader::manifest(&mut handle, compressor.as_ref(), cipher.as_ref(), bundle_name)?;
    apply_patch(state, &manifest, &mut handle, compressor.as_ref(), cipher.as_ref(), bundle_name)
}

/// Loads a bundle's manifest and extracts every asset, producing a
/// `BundleState` ready to be the precondition side of `patch_apply`.
pub fn load_bundle_state(archive: &Path, ctx: &BuildContext, bundle_name: &str) -> Result<(BundleState, String), QuackError> {
    let compressor = compressor_for(ctx.compression_algo);
    let cipher = make_cipher(ctx);
    let mut handle = QpkReader::open(archive)?;
    let manifest = QpkReader::manifest(&mut handle, compressor.as_ref(), cipher.as_ref(), bundle_name)?;

    let mut payloads: HashMap<(String, String), Vec<u8>> = HashMap::new();
    for by_path in manifest.assets.values() {
        for (path, entry) in by_path {
            for locale in &entry.locales {
                let bytes = QpkReader::extract(&mut handle, &manifest, path, locale, compressor.as_ref(), cipher.as_ref(), bundle_name)?;
                payloads.insert((path.clone(), locale.clone()), bytes);
            }
        }
    }

    let merkle_root = manifest.merkle_root.clone();
    Ok((BundleState::from_manifest(&manifest, payloads), merkle_root))
}

/// Appends a just-written patch to a bundle's workspace entry.
pub fn record_patch_in_workspace(
    workspace_root: &Path,
    bundle_name: &str,
    patch_path: &Path,
    from_version: &str,
    to_version: &str,
    change_count: u64,
) -> Result<WorkspaceIndex, QuackError> {
    let size = std::fs::metadata(patch_path)
        .map_err(|e| QuackError::Io { source: e, path: patch_path.to_path_buf() })?
        .len();
    let summary = PatchSummary {
        file: patch_path.to_path_buf(),
        from_v: from_version.to_string(),
        to_v: to_version.to_string(),
        change_count,
        size,
        created_at: now_epoch_secs(),
    };

    let store = WorkspaceIndexStore::new(workspace_root);
    let bundle_name_owned = bundle_name.to_string();
    store.update(
        || WorkspaceIndex::new(bundle_name.to_string()),
        move |index| {
            index.current_version += 1;
            if let Some(entry) = index.bundles.get_mut(&bundle_name_owned) {
                entry.patches.push(summary.clone());
            }
            index.global_patches.push(summary.clone());
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionAlgo;

    fn ctx() -> BuildContext {
        BuildContext {
            format: crate::config::BundleFormat::Qpk,
            compression_algo: CompressionAlgo::None,
            compression_level: 0,
            encryption_enabled: false,
            encryption_algo: None,
            encryption_key: None,
            ignore_globs: vec![],
            build_number: None,
            lzma_memory_ceiling_mib: None,
        }
    }

    fn write_asset(root: &Path, rel: &str, bytes: &[u8]) {
        let full = root.join(rel);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, bytes).unwrap();
    }

    #[test]
    fn scenario_s2_single_file_bundle_round_trips() {
        let src = tempfile::tempdir().unwrap();
        write_asset(src.path(), "data/config/a.json", b"{\"v\":1}\n");
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("main.qpk");

        let result = bundle(&ctx(), src.path(), &output, "main", "1.0.0", "build-1").unwrap();
        assert_eq!(result.manifest.totals.files, 1);
        assert_eq!(result.build_log.bundle_version, "1.0.0");

        let checked = verify(&output, &ctx(), "main").unwrap();
        assert_eq!(checked, 1);
    }

    #[test]
    fn workspace_bundle_records_build_log_and_index() {
        let src = tempfile::tempdir().unwrap();
        write_asset(src.path(), "data/config/a.json", b"{}");
        let workspace = tempfile::tempdir().unwrap();
        let output = workspace.path().join("main.qpk");

        let definition = BundleDefinition { source_dir: src.path().to_path_buf(), priority: None, deps: vec![], load_trigger: None };
        bundle_into_workspace(&ctx(), workspace.path(), "main", src.path(), &output, "1.0.0", "build-1", definition).unwrap();

        let index_store = WorkspaceIndexStore::new(workspace.path());
        let index = index_store.load().unwrap().unwrap();
        assert_eq!(index.bundles["main"].current_version, "1.0.0");

        let log_store = BuildLogStore::new(workspace.path());
        assert!(log_store.by_version("main", "1.0.0").unwrap().is_some());
    }

    #[test]
    fn patch_round_trip_advances_bundle_state() {
        let src_a = tempfile::tempdir().unwrap();
        write_asset(src_a.path(), "data/config/x.json", b"x-v1");
        write_asset(src_a.path(), "data/config/y.json", b"y-v1");
        let out_dir = tempfile::tempdir().unwrap();
        let bundle_a_path = out_dir.path().join("a.qpk");
        let result_a = bundle(&ctx(), src_a.path(), &bundle_a_path, "main", "1.0.0", "build-1").unwrap();

        let src_b = tempfile::tempdir().unwrap();
        write_asset(src_b.path(), "data/config/y.json", b"y-v2");
        write_asset(src_b.path(), "data/config/z.json", b"z-v1");
        let bundle_b_path = out_dir.path().join("b.qpk");
        let result_b = bundle(&ctx(), src_b.path(), &bundle_b_path, "main", "1.0.1", "build-2").unwrap();

        let patch_path = out_dir.path().join("patch.qpk");
        let patch_manifest = patch_create(&ctx(), &result_a.build_log, &result_b.build_log, src_b.path(), &patch_path, "main").unwrap();
        assert_eq!(patch_manifest.patch.as_ref().unwrap().operations.len(), 3);

        let (state_a, _root_a) = load_bundle_state(&bundle_a_path, &ctx(), "main").unwrap();
        let state_b = patch_apply(&ctx(), &state_a, &patch_path, "main").unwrap();
        assert_eq!(state_b.current_version, "1.0.1");
        assert_eq!(state_b.merkle_root(), result_b.build_log.merkle_root);
    }

    #[test]
    fn scenario_s6_patch_precondition_failure_is_reported() {
        let src_a = tempfile::tempdir().unwrap();
        write_asset(src_a.path(), "data/config/x.json", b"x-v1");
        let out_dir = tempfile::tempdir().unwrap();
        let bundle_a_path = out_dir.path().join("a.qpk");
        let result_a = bundle(&ctx(), src_a.path(), &bundle_a_path, "main", "1.0.0", "build-1").unwrap();

        let src_b = tempfile::tempdir().unwrap();
        write_asset(src_b.path(), "data/config/x.json", b"x-v2");
        let bundle_b_path = out_dir.path().join("b.qpk");
        let result_b = bundle(&ctx(), src_b.path(), &bundle_b_path, "main", "1.0.1", "build-2").unwrap();

        let patch_path = out_dir.path().join("patch.qpk");
        patch_create(&ctx(), &result_a.build_log, &result_b.build_log, src_b.path(), &patch_path, "main").unwrap();

        let mut stale_state = BundleState::new("0.9.0");
        stale_state.current_version = "0.9.0".to_string();
        let err = patch_apply(&ctx(), &stale_state, &patch_path, "main").unwrap_err();
        assert_eq!(err.kind_tag(), "version-mismatch");
    }
}
