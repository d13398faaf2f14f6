//! Patch Reader: opens a patch QPK and exposes its `patch` metadata plus
//! per-operation payload extraction (§4.L).
//!
//! A patch file is a regular QPK whose manifest happens to carry a `patch`
//! field, so this is a thin layer over [`QpkReader`] rather than a
//! parallel implementation of the binary format.

use std::path::Path;

use crate::cipher::CipherPlugin;
use crate::compress::Compressor;
use crate::error::QuackError;
use crate::manifest::Manifest;
use crate::patch::{Op, OpKind};
use crate::qpk::reader::{QpkHandle, QpkReader};

pub struct PatchReader;

impl PatchReader {
    pub fn open(path: &Path) -> Result<QpkHandle, QuackError> {
        QpkReader::open(path)
    }

    /// As [`QpkReader::manifest`], but rejects a bundle that carries no
    /// `patch` metadata — callers use this to fail fast on a regular bundle
    /// file handed to a patch-only verb.
    pub fn manifest(
        handle: &mut QpkHandle,
        compressor: &dyn Compressor,
        cipher: &dyn CipherPlugin,
        bundle_name: &str,
    ) -> Result<Manifest, QuackError> {
        let manifest = QpkReader::manifest(handle, compressor, cipher, bundle_name)?;
        if manifest.patch.is_none() {
            return Err(QuackError::Validation("bundle carries no patch metadata".into()));
        }
        Ok(manifest)
    }

    pub fn operations(manifest: &Manifest) -> Result<&[Op], QuackError> {
        manifest
            .patch
            .as_ref()
            .map(|p| p.operations.as_slice())
            .ok_or_else(|| QuackError::Validation("manifest carries no patch metadata".into()))
    }

    /// `None` for a `Delete` operation, which has no payload block.
    pub fn extract_operation_payload(
        handle: &mut QpkHandle,
        manifest: &Manifest,
        op: &Op,
        compressor: &dyn Compressor,
        cipher: &dyn CipherPlugin,
        bundle_name: &str,
    ) -> Result<Option<Vec<u8>>, QuackError> {
        match op.kind {
            OpKind::Delete => Ok(None),
            OpKind::Add | OpKind::Modify => {
                QpkReader::extract(handle, manifest, &op.path, &op.locale, compressor, cipher, bundle_name).map(Some)
            }
        }
    }
}
