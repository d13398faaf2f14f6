//! Plugin registry: trait objects keyed by capability + algorithm tag
//! (§6, §9 "Plugin registry with dynamic dispatch").
//!
//! Generalizes the teacher's compile-time `CompressionAlgo` match arms into
//! real dynamic dispatch: a build resolves its codec/cipher/processor/hook
//! set once against this registry, not per-asset reflection.

use std::collections::BTreeMap;
use std::path::Path;

use crate::asset::Asset;
use crate::cipher::CipherPlugin;
use crate::compress::Compressor;
use crate::error::QuackError;
use crate::manifest::Manifest;

/// Called by the Writer on each asset's raw bytes before compression. Must
/// be pure with respect to the bytes it returns (§6).
pub trait AssetProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, asset: &Asset, bytes: Vec<u8>) -> Result<Vec<u8>, QuackError>;
}

/// Invoked exactly once after the Writer's rename, before the build-log
/// write. Errors are logged and non-fatal (§6).
pub trait PostBundleHook: Send + Sync {
    fn name(&self) -> &'static str;
    fn post_bundle(&self, bundle_path: &Path, manifest: &Manifest) -> Result<(), QuackError>;
}

/// A tagged-union registration record built at configuration time —
/// mirrors the registration shape plugins declare their capabilities
/// through (§9).
pub enum PluginRegistration {
    Compression(Box<dyn Compressor>),
    Cipher(Box<dyn CipherPlugin>),
    AssetProcessor(Box<dyn AssetProcessor>),
    PostBundleHook(Box<dyn PostBundleHook>),
}

/// Ordered map keyed by capability (one bucket per trait) + algorithm tag.
/// Resolution at a codec boundary is an O(1) (or O(log n)) lookup, not a
/// scan over registered plugins.
#[derive(Default)]
pub struct PluginRegistry {
    compressors: BTreeMap<String, Box<dyn Compressor>>,
    ciphers: BTreeMap<String, Box<dyn CipherPlugin>>,
    processors: Vec<(String, Box<dyn AssetProcessor>)>,
    hooks: Vec<(String, Box<dyn PostBundleHook>)>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    pub fn register(&mut self, algo_tag: impl Into<String>, registration: PluginRegistration) {
        let tag = algo_tag.into();
        match registration {
            PluginRegistration::Compression(plugin) => {
                self.compressors.insert(tag, plugin);
            }
            PluginRegistration::Cipher(plugin) => {
                self.ciphers.insert(tag, plugin);
            }
            PluginRegistration::AssetProcessor(plugin) => {
                self.processors.push((tag, plugin));
            }
            PluginRegistration::PostBundleHook(plugin) => {
                self.hooks.push((tag, plugin));
            }
        }
    }

    pub fn compressor(&self, algo_tag: &str) -> Option<&dyn Compressor> {
        self.compressors.get(algo_tag).map(|b| b.as_ref())
    }

    pub fn cipher(&self, algo_tag: &str) -> Option<&dyn CipherPlugin> {
        self.ciphers.get(algo_tag).map(|b| b.as_ref())
    }

    /// Registration order, not sorted — asset processors are a pipeline.
    pub fn processors(&self) -> impl Iterator<Item = &dyn AssetProcessor> {
        self.processors.iter().map(|(_, p)| p.as_ref())
    }

    pub fn hooks(&self) -> impl Iterator<Item = &dyn PostBundleHook> {
        self.hooks.iter().map(|(_, h)| h.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetType;

    struct UppercaseProcessor;

    impl AssetProcessor for UppercaseProcessor {
        fn name(&self) -> &'static str {
            "uppercase"
        }

        fn process(&self, _asset: &Asset, bytes: Vec<u8>) -> Result<Vec<u8>, QuackError> {
            Ok(bytes.to_ascii_uppercase())
        }
    }

    struct CountingHook {
        count: std::sync::atomic::AtomicUsize,
    }

    impl PostBundleHook for CountingHook {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn post_bundle(&self, _bundle_path: &Path, _manifest: &Manifest) -> Result<(), QuackError> {
            self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_asset() -> Asset {
        Asset::from_bytes("data/a.json", AssetType::Data, "config", vec!["default".into()], b"{}", 0, "1.0.0", None).unwrap()
    }

    #[test]
    fn registers_and_runs_an_asset_processor() {
        let mut registry = PluginRegistry::new();
        registry.register("uppercase", PluginRegistration::AssetProcessor(Box::new(UppercaseProcessor)));
        let processors: Vec<&dyn AssetProcessor> = registry.processors().collect();
        assert_eq!(processors.len(), 1);
        let out = processors[0].process(&sample_asset(), b"abc".to_vec()).unwrap();
        assert_eq!(out, b"ABC");
    }

    #[test]
    fn post_bundle_hooks_fire_in_registration_order() {
        let mut registry = PluginRegistry::new();
        let hook = CountingHook { count: std::sync::atomic::AtomicUsize::new(0) };
        registry.register("counter", PluginRegistration::PostBundleHook(Box::new(hook)));
        for hook in registry.hooks() {
            hook.post_bundle(Path::new("bundle.qpk"), &sample_manifest()).unwrap();
        }
    }

    #[test]
    fn unregistered_algo_tag_returns_none() {
        let registry = PluginRegistry::new();
        assert!(registry.compressor("lzma").is_none());
        assert!(registry.cipher("aes-gcm").is_none());
    }

    fn sample_manifest() -> Manifest {
        let asset = sample_asset();
        let options = crate::manifest::ManifestOptions {
            name: "main".into(),
            bundle_version: "1.0.0".into(),
            build_id: "b1".into(),
            created_at: 0,
            default_locale: None,
            compression_algo: crate::compress::CompressionAlgo::None,
            compression_level: 0,
            encryption_enabled: false,
            encryption_algo: None,
            include_perf: false,
            workspace: None,
        };
        crate::manifest::build_manifest(&[asset], &options).unwrap()
    }
}
