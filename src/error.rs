//! Crate-wide error taxonomy.
//!
//! Every fallible operation in `quackpack` returns `Result<T, QuackError>`.
//! The variants mirror the error taxonomy of the format specification: they
//! are kinds, not ad hoc messages, so callers (in particular the CLI) can
//! match on them to pick an exit code or a user-facing tag.

use std::path::PathBuf;

use thiserror::Error;

/// The single error type returned by all `quackpack` operations.
#[derive(Debug, Error)]
pub enum QuackError {
    /// Malformed config, bad semver, bad locale, duplicate asset key, empty source.
    #[error("validation error: {0}")]
    Validation(String),

    /// Hash or Merkle-root mismatch, magic/format mismatch, truncated stream.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Compressor or cipher refused the input.
    #[error("codec error ({algo}): {kind}")]
    Codec { algo: &'static str, kind: String },

    /// A filesystem operation failed. The offending path is carried verbatim.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// The workspace index cursor advanced during the build.
    #[error("concurrent update: workspace index was modified by another writer")]
    ConcurrentUpdate,

    /// A patch's `from_version` does not match the bundle's current version.
    #[error("version mismatch: patch expects {expected}, bundle is at {actual}")]
    VersionMismatch { expected: String, actual: String },

    /// A patch's `from_merkle_root` does not match the bundle's computed root.
    #[error("root mismatch: patch precondition root does not match current bundle root")]
    RootMismatch,

    /// An `Add` targeted an existing key, or a `Modify`/`Delete` targeted a missing one.
    #[error("operation conflict: {0}")]
    OperationConflict(String),

    /// The patch's postcondition root did not match after applying all operations.
    #[error("patch corrupt: postcondition root mismatch after apply")]
    PatchCorrupt,

    /// The consumer could not obtain the encryption key the manifest declares.
    #[error("encryption key missing for declared cipher '{0}'")]
    EncryptionKeyMissing(String),
}

impl From<serde_json::Error> for QuackError {
    fn from(err: serde_json::Error) -> Self {
        QuackError::Validation(format!("JSON error: {err}"))
    }
}

impl From<toml::de::Error> for QuackError {
    fn from(err: toml::de::Error) -> Self {
        QuackError::Validation(format!("TOML error: {err}"))
    }
}

/// Generic IO error conversion that doesn't carry a path; prefer constructing
/// `QuackError::Io { source, path }` directly when a path is in scope.
impl From<std::io::Error> for QuackError {
    fn from(err: std::io::Error) -> Self {
        QuackError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}

impl QuackError {
    /// The short kind tag printed alongside the human-readable reason, e.g. `integrity`.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            QuackError::Validation(_) => "validation",
            QuackError::Integrity(_) => "integrity",
            QuackError::Codec { .. } => "codec",
            QuackError::Io { .. } => "io",
            QuackError::ConcurrentUpdate => "concurrent-update",
            QuackError::VersionMismatch { .. } => "version-mismatch",
            QuackError::RootMismatch => "root-mismatch",
            QuackError::OperationConflict(_) => "operation-conflict",
            QuackError::PatchCorrupt => "patch-corrupt",
            QuackError::EncryptionKeyMissing(_) => "encryption-key-missing",
        }
    }
}
