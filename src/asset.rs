//! The asset model: a canonical representation of one packaged asset plus
//! the two input collaborator traits (`AssetDiscoverer`,
//! `MediaMetadataExtractor`) through which the core receives them (§6).
//!
//! The core never walks a filesystem itself — it consumes a finite,
//! deterministic `Vec<Asset>` handed to it by a discoverer. A concrete,
//! filesystem-backed discoverer lives in [`crate::discover`], outside this
//! module, to keep that boundary visible in the crate layout.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::QuackError;

/// The closed set of top-level asset types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Images,
    Characters,
    Audio,
    Video,
    Scripts,
    Data,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Images => "images",
            AssetType::Characters => "characters",
            AssetType::Audio => "audio",
            AssetType::Video => "video",
            AssetType::Scripts => "scripts",
            AssetType::Data => "data",
        }
    }

    /// The closed per-type sub-type set, used for config-time validation.
    pub fn valid_sub_types(self) -> &'static [&'static str] {
        match self {
            AssetType::Images => &["backgrounds", "cg", "ui"],
            AssetType::Characters => &["sprites", "portraits", "expressions"],
            AssetType::Audio => &["bgm", "se", "voice"],
            AssetType::Video => &["cutscenes", "openings"],
            AssetType::Scripts => &["scenario", "system"],
            AssetType::Data => &["config", "save", "localization"],
        }
    }
}

/// Advisory, discriminated media metadata. Never used for codec decisions —
/// the core records dimensions/duration/format tags only, it does not
/// decode pixels or samples (spec Non-goal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MediaTag {
    Image {
        w: u32,
        h: u32,
        animated: bool,
        alpha: bool,
        depth: Option<u32>,
    },
    Audio {
        duration: f64,
        format: String,
        rate: Option<u32>,
        channels: Option<u32>,
        bitrate: Option<u32>,
    },
    Video {
        w: u32,
        h: u32,
        duration: f64,
        format: String,
        fps: Option<f32>,
        bitrate: Option<u32>,
        codec: Option<String>,
    },
}

/// One packaged asset: `(relative_path, type, sub_type, locales, size,
/// content_hash, mtime, version, media_tag?)` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub relative_path: String,
    pub asset_type: AssetType,
    pub sub_type: String,
    pub locales: Vec<String>,
    pub size: u64,
    pub content_hash: String,
    pub mtime: u64,
    pub version: String,
    pub media_tag: Option<MediaTag>,
}

/// Validates the locale tag grammar `default|[a-z]{2}(-[a-z]{2})?` by hand —
/// a single fixed pattern this small doesn't earn a `regex` dependency.
pub fn is_valid_locale(locale: &str) -> bool {
    if locale == "default" {
        return true;
    }
    let is_lower_alpha2 = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_lowercase());
    match locale.split_once('-') {
        None => is_lower_alpha2(locale),
        Some((lang, region)) => is_lower_alpha2(lang) && is_lower_alpha2(region),
    }
}

impl Asset {
    /// Computes `content_hash` from raw bytes and validates the asset's own
    /// invariants that don't require comparison against siblings
    /// (uniqueness across a bundle is checked by the Manifest Builder).
    pub fn from_bytes(
        relative_path: impl Into<String>,
        asset_type: AssetType,
        sub_type: impl Into<String>,
        locales: Vec<String>,
        bytes: &[u8],
        mtime: u64,
        version: impl Into<String>,
        media_tag: Option<MediaTag>,
    ) -> Result<Asset, QuackError> {
        let sub_type = sub_type.into();
        if !asset_type.valid_sub_types().contains(&sub_type.as_str()) {
            return Err(QuackError::Validation(format!(
                "sub_type '{sub_type}' is not valid for asset type '{}'",
                asset_type.as_str()
            )));
        }
        if locales.is_empty() {
            return Err(QuackError::Validation("asset locales must be non-empty".into()));
        }
        for locale in &locales {
            if !is_valid_locale(locale) {
                return Err(QuackError::Validation(format!("invalid locale tag '{locale}'")));
            }
        }
        Ok(Asset {
            relative_path: relative_path.into(),
            asset_type,
            sub_type,
            locales,
            size: bytes.len() as u64,
            content_hash: crate::hash::hash_bytes_hex(bytes),
            mtime,
            version: version.into(),
            media_tag,
        })
    }
}

/// Provides `discover(source_dir, ignore_globs) -> Seq[Asset]`. Must be
/// deterministic for a given directory snapshot (§6).
pub trait AssetDiscoverer {
    fn discover(&self, source_dir: &Path, ignore_globs: &[String]) -> Result<Vec<(Asset, Vec<u8>)>, QuackError>;
}

/// Provides `extract(path) -> MediaTag?`. Errors are non-fatal; the core
/// records `None` and continues (§6).
pub trait MediaMetadataExtractor {
    fn extract(&self, path: &Path) -> Option<MediaTag>;
}

/// The extractor the CLI wires in by default: media decoding is explicitly
/// out of scope, so this always returns `None`.
pub struct NoopMediaMetadataExtractor;

impl MediaMetadataExtractor for NoopMediaMetadataExtractor {
    fn extract(&self, _path: &Path) -> Option<MediaTag> {
        None
    }
}
