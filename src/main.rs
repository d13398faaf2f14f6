//! `quackpack` CLI entry point: parses arguments, resolves a [`BuildContext`],
//! dispatches to [`quackpack::pipeline`], and maps errors to exit codes
//! (spec.md §6: 0 on success, 1 on any fatal error, `verify` exits 1 on an
//! integrity failure specifically).

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;

use quackpack::buildlog::BuildLogStore;
use quackpack::cli::{self, Commands, PatchCommands, WorkspaceCommands};
use quackpack::config::{BuildContext, Config};
use quackpack::error::QuackError;
use quackpack::pipeline;
use quackpack::workspace::{BundleDefinition, WorkspaceIndex, WorkspaceIndexStore};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::run();
    match dispatch(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", err.kind_tag(), err);
            ExitCode::FAILURE
        }
    }
}

fn env_map() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn load_context(config_path: Option<&Path>) -> Result<BuildContext, QuackError> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    BuildContext::resolve(&config, &env_map())
}

fn dispatch(args: cli::Args) -> Result<(), QuackError> {
    let ctx = load_context(args.config.as_deref())?;

    match args.command {
        Commands::Bundle { source, output, name, bundle_version, build_id } => {
            let build_id = build_id.unwrap_or_else(|| bundle_version.clone());
            let result = pipeline::bundle(&ctx, &source, &output, &name, &bundle_version, &build_id)?;
            tracing::info!(files = result.manifest.totals.files, bundle = %output.display(), "bundle written");
            Ok(())
        }

        Commands::Extract { archive, path, locale, output, name } => {
            pipeline::extract_one(&archive, &path, &locale, &output, &ctx, &name)?;
            tracing::info!(path = %path, locale = %locale, "asset extracted");
            Ok(())
        }

        Commands::List { archive, name } => {
            let manifest = pipeline::read_manifest(&archive, &ctx, &name)?;
            for by_path in manifest.assets.values() {
                for (path, entry) in by_path {
                    println!("{path}\t{}\t{}", entry.locales.join(","), entry.content_hash);
                }
            }
            Ok(())
        }

        Commands::Verify { archive, name } => {
            let checked = pipeline::verify(&archive, &ctx, &name)?;
            println!("{checked} assets verified");
            Ok(())
        }

        Commands::Init { workspace, name } => {
            let store = WorkspaceIndexStore::new(&workspace);
            store.update(|| WorkspaceIndex::new(name.clone()), |_idx| Ok(()))?;
            Ok(())
        }

        Commands::Patch { command } => dispatch_patch(&ctx, command),

        Commands::Workspace { command } => dispatch_workspace(&ctx, command),

        Commands::VersionInfo { archive, name } => {
            let manifest = pipeline::read_manifest(&archive, &ctx, &name)?;
            println!("bundle_version: {}", manifest.bundle_version);
            println!("merkle_root: {}", manifest.merkle_root);
            Ok(())
        }

        Commands::Builds { workspace, bundle_name } => {
            let store = BuildLogStore::new(&workspace);
            for log in store.list(&bundle_name)? {
                println!("{}\t{}\t{}", log.bundle_version, log.build_id, log.merkle_root);
            }
            Ok(())
        }
    }
}

fn dispatch_patch(ctx: &BuildContext, command: PatchCommands) -> Result<(), QuackError> {
    match command {
        PatchCommands::Create { workspace, bundle_name, from_version, to_version, new_source, output } => {
            let log_store = BuildLogStore::new(&workspace);
            let old_log = log_store
                .by_version(&bundle_name, &from_version)?
                .ok_or_else(|| QuackError::Validation(format!("no build log for version '{from_version}'")))?;
            let new_log = log_store
                .by_version(&bundle_name, &to_version)?
                .ok_or_else(|| QuackError::Validation(format!("no build log for version '{to_version}'")))?;
            let manifest = pipeline::patch_create(ctx, &old_log, &new_log, &new_source, &output, &bundle_name)?;
            let change_count = manifest.patch.as_ref().map(|p| p.operations.len() as u64).unwrap_or(0);
            tracing::info!(changes = change_count, patch = %output.display(), "patch written");
            Ok(())
        }

        PatchCommands::List { patch_file } => {
            let manifest = pipeline::read_manifest(&patch_file, ctx, "main")?;
            for op in quackpack::patch::PatchReader::operations(&manifest)? {
                println!("{:?}\t{}\t{}", op.kind, op.path, op.locale);
            }
            Ok(())
        }

        PatchCommands::Validate { patch_file, bundle_file } => {
            let (state, _root) = pipeline::load_bundle_state(&bundle_file, ctx, "main")?;
            pipeline::patch_apply(ctx, &state, &patch_file, "main")?;
            println!("patch applies cleanly");
            Ok(())
        }
    }
}

fn dispatch_workspace(ctx: &BuildContext, command: WorkspaceCommands) -> Result<(), QuackError> {
    match command {
        WorkspaceCommands::Init { workspace, name } => {
            let store = WorkspaceIndexStore::new(&workspace);
            store.update(|| WorkspaceIndex::new(name.clone()), |_idx| Ok(()))?;
            Ok(())
        }

        WorkspaceCommands::Bundle { workspace, bundle_name, source, bundle_version, build_id } => {
            let build_id = build_id.unwrap_or_else(|| bundle_version.clone());
            let output = workspace.join(format!("{bundle_name}.qpk"));
            let definition = BundleDefinition { source_dir: source.clone(), priority: None, deps: vec![], load_trigger: None };
            pipeline::bundle_into_workspace(ctx, &workspace, &bundle_name, &source, &output, &bundle_version, &build_id, definition)?;
            Ok(())
        }

        WorkspaceCommands::Patch { workspace, bundle_name, from_version, to_version, new_source } => {
            let log_store = BuildLogStore::new(&workspace);
            let old_log = log_store
                .by_version(&bundle_name, &from_version)?
                .ok_or_else(|| QuackError::Validation(format!("no build log for version '{from_version}'")))?;
            let new_log = log_store
                .by_version(&bundle_name, &to_version)?
                .ok_or_else(|| QuackError::Validation(format!("no build log for version '{to_version}'")))?;
            let output = workspace.join("patches").join(&bundle_name).join(format!("{from_version}-to-{to_version}.qpk"));
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent).map_err(|e| QuackError::Io { source: e, path: parent.to_path_buf() })?;
            }
            let manifest = pipeline::patch_create(ctx, &old_log, &new_log, &new_source, &output, &bundle_name)?;
            let change_count = manifest.patch.as_ref().map(|p| p.operations.len() as u64).unwrap_or(0);
            pipeline::record_patch_in_workspace(&workspace, &bundle_name, &output, &from_version, &to_version, change_count)?;
            Ok(())
        }

        WorkspaceCommands::Status { workspace } => {
            let store = WorkspaceIndexStore::new(&workspace);
            match store.load()? {
                Some(index) => {
                    for (name, bundle) in &index.bundles {
                        println!("{name}\t{}\t{}", bundle.current_version, bundle.latest.merkle_root);
                    }
                    Ok(())
                }
                None => Err(QuackError::Validation(format!("no workspace index at '{}'", workspace.display()))),
            }
        }

        WorkspaceCommands::Patches { workspace } => {
            let store = WorkspaceIndexStore::new(&workspace);
            match store.load()? {
                Some(index) => {
                    for patch in &index.global_patches {
                        println!("{}\t{}->{}\t{}", patch.file.display(), patch.from_v, patch.to_v, patch.change_count);
                    }
                    Ok(())
                }
                None => Err(QuackError::Validation(format!("no workspace index at '{}'", workspace.display()))),
            }
        }
    }
}
