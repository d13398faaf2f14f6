//! SHA-256 hashing over raw bytes and over canonical asset records.
//!
//! Canonical-record hashing concatenates fields in a fixed order with a
//! single `0x00` separator and no length prefix: every field in the record
//! has a fixed terminator in context, so a length prefix would be redundant.

use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest, rendered as lowercase hex wherever it crosses
/// a serialization boundary (manifest, build log).
pub type Digest32 = [u8; 32];

/// Hashes a byte slice and returns the lowercase hex digest.
pub fn hash_bytes_hex(data: &[u8]) -> String {
    hex_lower(&hash_bytes(data))
}

/// Hashes a byte slice and returns the raw 32-byte digest.
pub fn hash_bytes(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes the canonical record `relative_path || 0x00 || locale || 0x00 || content_hash`.
///
/// `content_hash` is expected to already be the lowercase-hex SHA-256 of the
/// asset's raw bytes; this function does not hash raw bytes itself.
pub fn hash_asset_record(relative_path: &str, locale: &str, content_hash: &str) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    hasher.update([0x00]);
    hasher.update(locale.as_bytes());
    hasher.update([0x00]);
    hasher.update(content_hash.as_bytes());
    hasher.finalize().into()
}

/// Hashes two child digests into their parent: `SHA-256(left || right)`.
pub fn hash_interior(left: &Digest32, right: &Digest32) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Renders a digest as lowercase hex.
pub fn hex_lower(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Parses a lowercase-hex digest back into raw bytes. Used when validating
/// a manifest's `merkle_root` or an asset's `content_hash` against computed
/// values.
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bytes_is_stable() {
        let a = hash_bytes_hex(b"hello world");
        let b = hash_bytes_hex(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_bytes_matches_known_vector() {
        // SHA-256("abc")
        let expected = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(expected.len(), 64);
        assert_eq!(hash_bytes_hex(b"abc"), expected);
    }

    #[test]
    fn asset_record_hash_is_order_sensitive() {
        let a = hash_asset_record("a.json", "default", "deadbeef");
        let b = hash_asset_record("b.json", "default", "deadbeef");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trips() {
        let digest = hash_bytes(b"round trip me");
        let hex = hex_lower(&digest);
        let parsed = parse_hex(&hex).unwrap();
        assert_eq!(parsed, digest.to_vec());
    }
}
