//! Symmetric transforms applied to a QPK payload block after compression.
//!
//! `Codec` order is fixed: compress first, then encrypt (§4.C). The Reader
//! inverts in the opposite order. `CipherPlugin` is the capability trait a
//! pluggable, user-supplied cipher implements; `NoneCipher` and `XorCipher`
//! are the two built-ins the format requires, and `AesGcmCipher` is shipped
//! as a concrete example of the pluggable slot, grounded in the teacher's
//! original AES-256-GCM implementation.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::QuackError;

/// Read-only context handed to a cipher so keyed schemes can vary behavior
/// per asset without the cipher needing to own archive state.
#[derive(Debug, Clone)]
pub struct CipherContext<'a> {
    pub asset_path: &'a str,
    pub asset_type: &'a str,
    pub bundle_name: &'a str,
}

/// The algorithm tag stored in bits 1-7 of the QPK header's `encryption_flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgoTag {
    Xor,
    AesGcm,
    Custom(u8),
}

impl AlgoTag {
    pub fn to_bits(self) -> u8 {
        match self {
            AlgoTag::Xor => 0,
            AlgoTag::AesGcm => 1,
            AlgoTag::Custom(n) => n,
        }
    }

    pub fn from_bits(bits: u8) -> AlgoTag {
        match bits {
            0 => AlgoTag::Xor,
            1 => AlgoTag::AesGcm,
            n => AlgoTag::Custom(n),
        }
    }
}

/// A symmetric transform over a compressed payload block.
pub trait CipherPlugin: Send + Sync {
    /// Stable name, used as the algorithm tag in configuration and plugin registration.
    fn name(&self) -> &'static str;

    fn algo_tag(&self) -> AlgoTag;

    fn encrypt(&self, bytes: &[u8], ctx: &CipherContext) -> Result<Vec<u8>, QuackError>;

    fn decrypt(&self, bytes: &[u8], ctx: &CipherContext) -> Result<Vec<u8>, QuackError>;
}

/// Identity cipher; used when encryption is disabled.
pub struct NoneCipher;

impl CipherPlugin for NoneCipher {
    fn name(&self) -> &'static str {
        "none"
    }

    fn algo_tag(&self) -> AlgoTag {
        AlgoTag::Custom(0x7f)
    }

    fn encrypt(&self, bytes: &[u8], _ctx: &CipherContext) -> Result<Vec<u8>, QuackError> {
        Ok(bytes.to_vec())
    }

    fn decrypt(&self, bytes: &[u8], _ctx: &CipherContext) -> Result<Vec<u8>, QuackError> {
        Ok(bytes.to_vec())
    }
}

/// Repeating-key XOR. The key comes from configuration or `QUACK_ENCRYPTION_KEY`.
///
/// An empty/absent key silently downgrades encryption to a no-op on the
/// producer side; the consumer side cannot silently downgrade because the
/// manifest has already declared encryption, so a missing key is a hard
/// error there (`EncryptionKeyMissing`, surfaced by the caller that reads
/// the manifest, not by this type itself).
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    fn apply(&self, bytes: &[u8]) -> Vec<u8> {
        if self.key.is_empty() {
            return bytes.to_vec();
        }
        bytes
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key[i % self.key.len()])
            .collect()
    }
}

impl CipherPlugin for XorCipher {
    fn name(&self) -> &'static str {
        "xor"
    }

    fn algo_tag(&self) -> AlgoTag {
        AlgoTag::Xor
    }

    fn encrypt(&self, bytes: &[u8], _ctx: &CipherContext) -> Result<Vec<u8>, QuackError> {
        Ok(self.apply(bytes))
    }

    fn decrypt(&self, bytes: &[u8], _ctx: &CipherContext) -> Result<Vec<u8>, QuackError> {
        // XOR is its own inverse.
        Ok(self.apply(bytes))
    }
}

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;
const PBKDF2_ROUNDS: u32 = 100_000;

/// AES-256-GCM, keyed by PBKDF2-HMAC-SHA256 over a user password and a
/// per-archive salt. Ships as a concrete example of the spec's "pluggable"
/// cipher slot: a real AEAD scheme registered under its own algorithm tag,
/// not one of the two built-ins the format mandates.
///
/// The nonce is random per block and is prepended to the ciphertext so
/// `decrypt` is self-contained given only the key.
pub struct AesGcmCipher {
    key: [u8; KEY_SIZE],
}

impl AesGcmCipher {
    pub fn generate_salt() -> [u8; SALT_SIZE] {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    pub fn derive(password: &str, salt: &[u8]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        Self { key }
    }
}

impl CipherPlugin for AesGcmCipher {
    fn name(&self) -> &'static str {
        "aes-gcm"
    }

    fn algo_tag(&self) -> AlgoTag {
        AlgoTag::AesGcm
    }

    fn encrypt(&self, bytes: &[u8], _ctx: &CipherContext) -> Result<Vec<u8>, QuackError> {
        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, bytes).map_err(|e| QuackError::Codec {
            algo: "aes-gcm",
            kind: format!("encrypt failed: {e}"),
        })?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, bytes: &[u8], _ctx: &CipherContext) -> Result<Vec<u8>, QuackError> {
        if bytes.len() < NONCE_SIZE {
            return Err(QuackError::Codec {
                algo: "aes-gcm",
                kind: "block shorter than nonce".into(),
            });
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| QuackError::Codec {
                algo: "aes-gcm",
                kind: format!("decrypt failed: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> CipherContext<'a> {
        CipherContext {
            asset_path: "scripts/s.js",
            asset_type: "scripts",
            bundle_name: "main",
        }
    }

    #[test]
    fn none_cipher_is_identity() {
        let c = NoneCipher;
        let data = b"plain bytes";
        let enc = c.encrypt(data, &ctx()).unwrap();
        assert_eq!(enc, data);
        let dec = c.decrypt(&enc, &ctx()).unwrap();
        assert_eq!(dec, data);
    }

    #[test]
    fn xor_round_trips() {
        let c = XorCipher::new(b"k3y".to_vec());
        let data = b"some bytes to obfuscate, longer than the key";
        let enc = c.encrypt(data, &ctx()).unwrap();
        assert_ne!(enc, data);
        let dec = c.decrypt(&enc, &ctx()).unwrap();
        assert_eq!(dec, data);
    }

    #[test]
    fn xor_with_empty_key_is_identity() {
        let c = XorCipher::new(Vec::new());
        let data = b"unchanged";
        assert_eq!(c.encrypt(data, &ctx()).unwrap(), data);
    }

    #[test]
    fn aes_gcm_round_trips() {
        let salt = AesGcmCipher::generate_salt();
        let cipher = AesGcmCipher::derive("correct horse battery staple", &salt);
        let data = b"secret asset bytes";
        let enc = cipher.encrypt(data, &ctx()).unwrap();
        assert_ne!(enc, data);
        let dec = cipher.decrypt(&enc, &ctx()).unwrap();
        assert_eq!(dec, data);
    }

    #[test]
    fn aes_gcm_wrong_key_fails() {
        let salt = AesGcmCipher::generate_salt();
        let cipher = AesGcmCipher::derive("right-password", &salt);
        let data = b"secret asset bytes";
        let enc = cipher.encrypt(data, &ctx()).unwrap();

        let wrong = AesGcmCipher::derive("wrong-password", &salt);
        assert!(wrong.decrypt(&enc, &ctx()).is_err());
    }
}
