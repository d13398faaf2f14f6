//! Command-line surface (spec.md §6): `bundle`, `extract`, `list`, `verify`,
//! `init`, `patch {create|list|validate}`, `workspace
//! {init|bundle|patch|status|patches}`, `version-info`, `builds`.
//!
//! This module is pure argument parsing — every verb's actual behavior lives
//! in [`crate::pipeline`]; `main.rs` is the only thing that calls both.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Content-addressed asset bundler and differential patcher for interactive-fiction runtimes", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a quackpack config file (TOML, or JSON by extension).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package a source directory into a QPK bundle.
    Bundle {
        /// Directory to discover assets from.
        source: PathBuf,

        /// Output path for the bundle file.
        #[arg(short, long)]
        output: PathBuf,

        /// Logical bundle name, also used as the cipher's AAD context.
        #[arg(long, default_value = "main")]
        name: String,

        /// `MAJOR.MINOR.PATCH[-pre]` version for this build.
        #[arg(long)]
        bundle_version: String,

        /// Build identifier. Defaults to the bundle version if omitted.
        #[arg(long)]
        build_id: Option<String>,
    },

    /// Extract a single asset from a bundle to a file.
    Extract {
        /// The bundle file to read.
        archive: PathBuf,

        /// The asset's relative path inside the bundle.
        path: String,

        /// Locale to extract.
        #[arg(long, default_value = "default")]
        locale: String,

        /// Destination file for the extracted bytes.
        #[arg(short, long)]
        output: PathBuf,

        /// Bundle name used as the cipher's AAD context.
        #[arg(long, default_value = "main")]
        name: String,
    },

    /// List every asset a bundle's manifest declares.
    List {
        archive: PathBuf,

        #[arg(long, default_value = "main")]
        name: String,
    },

    /// Re-extract every asset and verify its content hash.
    Verify {
        archive: PathBuf,

        #[arg(long, default_value = "main")]
        name: String,
    },

    /// Initialize an empty workspace at a directory.
    Init {
        /// Workspace root directory (created if absent).
        workspace: PathBuf,

        /// The workspace's display name.
        #[arg(long)]
        name: String,
    },

    /// Differential patch operations.
    Patch {
        #[command(subcommand)]
        command: PatchCommands,
    },

    /// Multi-bundle workspace operations.
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },

    /// Print a bundle's manifest version/merkle-root summary.
    VersionInfo {
        archive: PathBuf,

        #[arg(long, default_value = "main")]
        name: String,
    },

    /// List every recorded build for a bundle in a workspace.
    Builds {
        workspace: PathBuf,

        bundle_name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PatchCommands {
    /// Compute a patch between two recorded builds and write it to disk.
    Create {
        /// Workspace root the build logs live under.
        workspace: PathBuf,

        bundle_name: String,

        /// The build version to patch from.
        from_version: String,

        /// The build version to patch to.
        to_version: String,

        /// Source directory for the `to_version` build's assets.
        new_source: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print a patch file's operation list.
    List { patch_file: PathBuf },

    /// Apply a patch file to a bundle file, writing the resulting bundle.
    Validate {
        patch_file: PathBuf,

        /// The bundle file the patch's `from_version` should apply to.
        bundle_file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommands {
    /// Initialize a workspace index at a directory.
    Init { workspace: PathBuf, name: String },

    /// Build a named bundle and record it into the workspace.
    Bundle {
        workspace: PathBuf,
        bundle_name: String,
        source: PathBuf,
        bundle_version: String,
        build_id: Option<String>,
    },

    /// Create a patch between two recorded versions and record it.
    Patch {
        workspace: PathBuf,
        bundle_name: String,
        from_version: String,
        to_version: String,
        new_source: PathBuf,
    },

    /// Print the workspace's current bundle/version summary.
    Status { workspace: PathBuf },

    /// List every patch recorded in the workspace.
    Patches { workspace: PathBuf },
}

/// Parses `std::env::args()` into the top-level [`Args`].
pub fn run() -> Args {
    Args::parse()
}
