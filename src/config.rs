//! Recognized configuration surface (§6) plus the per-build context derived
//! from it.
//!
//! `Config` is the on-disk/CLI-facing shape: TOML (or JSON) via `serde`,
//! `deny_unknown_fields` so an unrecognized key is a `ValidationError`
//! rather than a silently ignored typo. `BuildContext` is what the rest of
//! the crate actually consumes — an immutable snapshot of `Config` plus the
//! handful of environment variables the format cares about, resolved once at
//! the start of an operation and threaded through by value.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::QuackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    Qpk,
    Zip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    #[serde(default = "default_compression_algo")]
    pub algo: String,
    #[serde(default = "default_compression_level")]
    pub level: u32,
}

fn default_compression_algo() -> String {
    "lzma".to_string()
}

fn default_compression_level() -> u32 {
    6
}

impl Default for CompressionConfig {
    fn default() -> CompressionConfig {
        CompressionConfig { algo: default_compression_algo(), level: default_compression_level() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub enabled: bool,
    pub algo: Option<String>,
    pub key: Option<String>,
    pub key_generator: Option<String>,
    pub plugin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningStrategy {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersioningConfig {
    pub bundle_version: Option<String>,
    pub build_number: Option<String>,
    #[serde(default = "default_versioning_strategy")]
    pub strategy: VersioningStrategy,
}

fn default_versioning_strategy() -> VersioningStrategy {
    VersioningStrategy::Auto
}

impl Default for VersioningConfig {
    fn default() -> VersioningConfig {
        VersioningConfig { bundle_version: None, build_number: None, strategy: default_versioning_strategy() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub name: String,
    pub version: Option<String>,
    #[serde(default)]
    pub bundles: Vec<String>,
    #[serde(default)]
    pub global_settings: std::collections::BTreeMap<String, String>,
    pub output: Option<PathBuf>,
}

/// The complete recognized configuration surface (§6). Unknown keys at any
/// level are rejected, not ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: Option<BundleFormat>,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub versioning: VersioningConfig,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    pub workspace: Option<WorkspaceConfig>,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Config, QuackError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Config, QuackError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Config, QuackError> {
        let text = std::fs::read_to_string(path).map_err(|e| QuackError::Io { source: e, path: path.to_path_buf() })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Config::from_json_str(&text),
            _ => Config::from_toml_str(&text),
        }
    }
}

/// Resolves `format = auto`: `qpk` in production, `zip` otherwise. "Production"
/// here is whatever `BUILD_NUMBER` being set signals — a release build has a
/// build number injected by CI, a dev build doesn't.
fn resolve_auto_format(build_number: &Option<String>) -> BundleFormat {
    if build_number.is_some() {
        BundleFormat::Qpk
    } else {
        BundleFormat::Zip
    }
}

/// Immutable per-build snapshot of resolved configuration plus the
/// environment. Constructed once at the start of `bundle`/`patch
/// create`/`workspace bundle` and threaded through by value; the
/// environment is never re-read mid-build (§5, §9).
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub format: BundleFormat,
    pub compression_algo: crate::compress::CompressionAlgo,
    pub compression_level: u32,
    pub encryption_enabled: bool,
    pub encryption_algo: Option<String>,
    pub encryption_key: Option<Vec<u8>>,
    pub ignore_globs: Vec<String>,
    pub build_number: Option<String>,
    pub lzma_memory_ceiling_mib: Option<u64>,
}

impl BuildContext {
    /// Resolves `config` against the process environment exactly once. Key
    /// resolution order (§6): literal config key → key_generator → env
    /// `QUACK_ENCRYPTION_KEY` → disabled.
    pub fn resolve(config: &Config, env: &std::collections::HashMap<String, String>) -> Result<BuildContext, QuackError> {
        let build_number = env.get("BUILD_NUMBER").cloned().or_else(|| config.versioning.build_number.clone());

        let format = match config.format {
            Some(f) => f,
            None => resolve_auto_format(&build_number),
        };

        let compression_algo = match config.compression.algo.as_str() {
            "none" => crate::compress::CompressionAlgo::None,
            "deflate" => crate::compress::CompressionAlgo::Deflate,
            "lzma" => crate::compress::CompressionAlgo::Lzma,
            other => return Err(QuackError::Validation(format!("unknown compression algo '{other}'"))),
        };

        let encryption_key = if config.encryption.enabled {
            let key = config
                .encryption
                .key
                .clone()
                .or_else(|| config.encryption.key_generator.clone())
                .or_else(|| env.get("QUACK_ENCRYPTION_KEY").cloned());
            key.map(|k| k.into_bytes())
        } else {
            None
        };

        let lzma_memory_ceiling_mib = env.get("QUACK_LZMA_MEMORY").and_then(|v| v.parse::<u64>().ok());

        Ok(BuildContext {
            format,
            compression_algo,
            compression_level: config.compression.level,
            encryption_enabled: config.encryption.enabled,
            encryption_algo: config.encryption.algo.clone(),
            encryption_key,
            ignore_globs: config.ignore.clone(),
            build_number,
            lzma_memory_ceiling_mib,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_top_level_key() {
        let err = Config::from_toml_str("bogus_key = 1\n").unwrap_err();
        assert_eq!(err.kind_tag(), "validation");
    }

    #[test]
    fn defaults_match_qpk_lzma_6() {
        let config = Config::from_toml_str("source = \"/tmp/assets\"\n").unwrap();
        assert_eq!(config.compression.algo, "lzma");
        assert_eq!(config.compression.level, 6);
    }

    #[test]
    fn auto_format_picks_qpk_when_build_number_present() {
        let config = Config::default();
        let mut env = std::collections::HashMap::new();
        env.insert("BUILD_NUMBER".to_string(), "42".to_string());
        let ctx = BuildContext::resolve(&config, &env).unwrap();
        assert_eq!(ctx.format, BundleFormat::Qpk);
        assert_eq!(ctx.build_number.as_deref(), Some("42"));
    }

    #[test]
    fn auto_format_picks_zip_without_build_number() {
        let config = Config::default();
        let env = std::collections::HashMap::new();
        let ctx = BuildContext::resolve(&config, &env).unwrap();
        assert_eq!(ctx.format, BundleFormat::Zip);
    }

    #[test]
    fn encryption_key_falls_back_to_env_var() {
        let mut config = Config::default();
        config.encryption.enabled = true;
        let mut env = std::collections::HashMap::new();
        env.insert("QUACK_ENCRYPTION_KEY".to_string(), "env-key".to_string());
        let ctx = BuildContext::resolve(&config, &env).unwrap();
        assert_eq!(ctx.encryption_key, Some(b"env-key".to_vec()));
    }

    #[test]
    fn encryption_disabled_never_resolves_a_key() {
        let mut config = Config::default();
        config.encryption.enabled = false;
        let mut env = std::collections::HashMap::new();
        env.insert("QUACK_ENCRYPTION_KEY".to_string(), "env-key".to_string());
        let ctx = BuildContext::resolve(&config, &env).unwrap();
        assert_eq!(ctx.encryption_key, None);
    }
}
