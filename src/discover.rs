//! Filesystem-backed [`AssetDiscoverer`], the default the CLI wires up.
//!
//! The core never walks a filesystem itself (§4.D) — this module is the
//! concrete collaborator that does, grounded in the teacher's
//! `WalkDir`-based directory enumeration, generalized to classify each file
//! into an [`Asset`] instead of a flat path list.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::asset::{Asset, AssetType, MediaTag, MediaMetadataExtractor, NoopMediaMetadataExtractor};
use crate::error::QuackError;

/// Classifies a relative path's first component into an [`AssetType`], and
/// its second component into that type's sub_type. Locale is read from a
/// `@locale` path segment if present (e.g. `audio/voice/@en-us/line01.ogg`),
/// else defaults to `["default"]`.
fn classify(relative_path: &str) -> Option<(AssetType, String)> {
    let mut parts = relative_path.split('/');
    let type_seg = parts.next()?;
    let sub_seg = parts.next()?;
    let asset_type = match type_seg {
        "images" => AssetType::Images,
        "characters" => AssetType::Characters,
        "audio" => AssetType::Audio,
        "video" => AssetType::Video,
        "scripts" => AssetType::Scripts,
        "data" => AssetType::Data,
        _ => return None,
    };
    Some((asset_type, sub_seg.to_string()))
}

fn extract_locale(relative_path: &str) -> (String, Vec<String>) {
    for segment in relative_path.split('/') {
        if let Some(locale) = segment.strip_prefix('@') {
            return (relative_path.replacen(&format!("@{locale}/"), "", 1), vec![locale.to_string()]);
        }
    }
    (relative_path.to_string(), vec!["default".to_string()])
}

/// Walks a source directory, classifying every regular file that matches the
/// closed `{type}/{sub_type}/...` layout and isn't excluded by `ignore_globs`.
/// Entries under `.quack/` are always skipped — that's the core's own
/// auxiliary state directory, never an input.
pub struct FsAssetDiscoverer {
    extractor: Box<dyn MediaMetadataExtractor>,
    bundle_version: String,
}

impl FsAssetDiscoverer {
    pub fn new(bundle_version: impl Into<String>) -> Self {
        Self {
            extractor: Box::new(NoopMediaMetadataExtractor),
            bundle_version: bundle_version.into(),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn MediaMetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

/// Matches a single glob of the simple `*`/`**` shell-style subset the
/// config's `ignore` list uses — deliberately not the full `glob` crate
/// grammar, since only `*` and literal segments appear in practice here.
fn glob_matches(pattern: &str, relative_path: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("**/") {
        return relative_path.ends_with(suffix) || relative_path.contains(&format!("/{suffix}"));
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return relative_path.starts_with(prefix);
    }
    if let Some(ext) = pattern.strip_prefix('*') {
        return relative_path.ends_with(ext);
    }
    relative_path == pattern
}

impl crate::asset::AssetDiscoverer for FsAssetDiscoverer {
    fn discover(&self, source_dir: &Path, ignore_globs: &[String]) -> Result<Vec<(Asset, Vec<u8>)>, QuackError> {
        if !source_dir.is_dir() {
            return Err(QuackError::Validation(format!(
                "source directory '{}' does not exist",
                source_dir.display()
            )));
        }

        let mut out = Vec::new();

        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| QuackError::Io {
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                path: source_dir.to_path_buf(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let abs_path = entry.path();
            let rel_path = match abs_path.strip_prefix(source_dir) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let rel_str = normalize_separators(rel_path);

            if rel_str.starts_with(".quack/") {
                continue;
            }
            if ignore_globs.iter().any(|g| glob_matches(g, &rel_str)) {
                debug!(path = %rel_str, "skipped by ignore glob");
                continue;
            }

            let (logical_path, locales) = extract_locale(&rel_str);
            let Some((asset_type, sub_type)) = classify(&logical_path) else {
                warn!(path = %rel_str, "skipped: does not match {{type}}/{{sub_type}}/... layout");
                continue;
            };

            let bytes = std::fs::read(abs_path).map_err(|e| QuackError::Io {
                source: e,
                path: abs_path.to_path_buf(),
            })?;
            let mtime = mtime_secs(abs_path)?;
            let media_tag: Option<MediaTag> = self.extractor.extract(abs_path);

            let asset = Asset::from_bytes(
                logical_path,
                asset_type,
                sub_type,
                locales,
                &bytes,
                mtime,
                self.bundle_version.clone(),
                media_tag,
            )?;
            out.push((asset, bytes));
        }

        Ok(out)
    }
}

fn normalize_separators(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn mtime_secs(path: &Path) -> Result<u64, QuackError> {
    let meta = std::fs::metadata(path).map_err(|e| QuackError::Io {
        source: e,
        path: path.to_path_buf(),
    })?;
    let modified = meta.modified().map_err(|e| QuackError::Io {
        source: e,
        path: path.to_path_buf(),
    })?;
    Ok(modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetDiscoverer;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let full = root.join(rel);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    #[test]
    fn discovers_and_classifies_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data/config/a.json", b"{}");
        write(dir.path(), "images/backgrounds/bg1.png", b"fakepng");

        let discoverer = FsAssetDiscoverer::new("1.0.0");
        let found = discoverer.discover(dir.path(), &[]).unwrap();
        assert_eq!(found.len(), 2);

        let names: Vec<_> = found.iter().map(|(a, _)| a.relative_path.clone()).collect();
        assert!(names.contains(&"data/config/a.json".to_string()));
        assert!(names.contains(&"images/backgrounds/bg1.png".to_string()));
    }

    #[test]
    fn skips_files_outside_closed_layout() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", b"not an asset");

        let discoverer = FsAssetDiscoverer::new("1.0.0");
        let found = discoverer.discover(dir.path(), &[]).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn honors_ignore_globs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data/config/a.json", b"{}");
        write(dir.path(), "data/config/a.json.bak", b"{}");

        let discoverer = FsAssetDiscoverer::new("1.0.0");
        let found = discoverer
            .discover(dir.path(), &["*.bak".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.relative_path, "data/config/a.json");
    }

    #[test]
    fn extracts_locale_from_at_segment() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "audio/voice/@en-us/line01.ogg", b"oggdata");

        let discoverer = FsAssetDiscoverer::new("1.0.0");
        let found = discoverer.discover(dir.path(), &[]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.relative_path, "audio/voice/line01.ogg");
        assert_eq!(found[0].0.locales, vec!["en-us".to_string()]);
    }

    #[test]
    fn rejects_missing_source_directory() {
        let discoverer = FsAssetDiscoverer::new("1.0.0");
        let err = discoverer
            .discover(Path::new("/nonexistent/surely/not/here"), &[])
            .unwrap_err();
        assert_eq!(err.kind_tag(), "validation");
    }
}
