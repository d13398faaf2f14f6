//! Block compression codecs: `none`, `deflate`, `lzma`.
//!
//! A `Compressor` operates on one payload block at a time — one asset's raw
//! bytes in, one stored block out. There is no bundling or dictionary
//! training here: unlike the teacher's multi-file bundle compressor, the QPK
//! format stores one payload block per asset (§4.G), so the unit of work is
//! a single byte slice.

use std::io::{Read, Write};

use crate::error::QuackError;

mod lzma;

/// The compression algorithm tag stored in the QPK header (`compression_algo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    None = 0,
    Deflate = 1,
    Lzma = 2,
}

impl CompressionAlgo {
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(v: u32) -> Option<CompressionAlgo> {
        match v {
            0 => Some(CompressionAlgo::None),
            1 => Some(CompressionAlgo::Deflate),
            2 => Some(CompressionAlgo::Lzma),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgo::None => "none",
            CompressionAlgo::Deflate => "deflate",
            CompressionAlgo::Lzma => "lzma",
        }
    }
}

/// A reversible block codec: `decode(encode(x, level)) == x` for any `x`
/// and valid `level` (§8 invariant 1).
pub trait Compressor: Send + Sync {
    fn algo(&self) -> CompressionAlgo;

    fn encode(&self, bytes: &[u8], level: u32) -> Result<Vec<u8>, QuackError>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, QuackError>;
}

/// Identity codec.
pub struct NoneCodec;

impl Compressor for NoneCodec {
    fn algo(&self) -> CompressionAlgo {
        CompressionAlgo::None
    }

    fn encode(&self, bytes: &[u8], _level: u32) -> Result<Vec<u8>, QuackError> {
        Ok(bytes.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, QuackError> {
        Ok(bytes.to_vec())
    }
}

/// Raw RFC-1951 deflate, headerless — the stored size is carried externally
/// in the manifest/index, so no zlib or gzip wrapper is needed.
pub struct DeflateCodec;

impl Compressor for DeflateCodec {
    fn algo(&self) -> CompressionAlgo {
        CompressionAlgo::Deflate
    }

    fn encode(&self, bytes: &[u8], level: u32) -> Result<Vec<u8>, QuackError> {
        let level = level.min(9);
        let mut encoder = flate2::write::DeflateEncoder::new(
            Vec::new(),
            flate2::Compression::new(level),
        );
        encoder.write_all(bytes).map_err(|e| QuackError::Codec {
            algo: "deflate",
            kind: format!("encode failed: {e}"),
        })?;
        encoder.finish().map_err(|e| QuackError::Codec {
            algo: "deflate",
            kind: format!("encode finish failed: {e}"),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, QuackError> {
        let mut decoder = flate2::read::DeflateDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| QuackError::Codec {
            algo: "deflate",
            kind: format!("truncated or malformed block: {e}"),
        })?;
        Ok(out)
    }
}

/// LZMA1 stream variant: a self-contained block of `[properties byte][4-byte
/// little-endian dictionary size][raw LZMA1 stream]`. Level 0-9 maps to the
/// standard xz preset table. The dictionary-size ceiling is governed by
/// `lzma::memory_ceiling_bytes` (default 256 MiB, `QUACK_LZMA_MEMORY`
/// override in MiB).
pub struct LzmaCodec;

impl Compressor for LzmaCodec {
    fn algo(&self) -> CompressionAlgo {
        CompressionAlgo::Lzma
    }

    fn encode(&self, bytes: &[u8], level: u32) -> Result<Vec<u8>, QuackError> {
        lzma::encode(bytes, level.min(9))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, QuackError> {
        lzma::decode(bytes)
    }
}

/// Returns the built-in compressor for an algorithm tag.
pub fn compressor_for(algo: CompressionAlgo) -> Box<dyn Compressor> {
    match algo {
        CompressionAlgo::None => Box::new(NoneCodec),
        CompressionAlgo::Deflate => Box::new(DeflateCodec),
        CompressionAlgo::Lzma => Box::new(LzmaCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(codec: &dyn Compressor, data: &[u8], level: u32) {
        let encoded = codec.encode(data, level).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn none_round_trips() {
        round_trip(&NoneCodec, b"arbitrary bytes\x00\x01\x02", 0);
    }

    #[test]
    fn deflate_round_trips_at_every_level() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
        for level in 0..=9 {
            round_trip(&DeflateCodec, &data, level);
        }
    }

    #[test]
    fn deflate_round_trips_empty_input() {
        round_trip(&DeflateCodec, b"", 6);
    }

    #[test]
    fn lzma_round_trips_repetitive_data() {
        let data = b"ab".repeat(5000);
        round_trip(&LzmaCodec, &data, 6);
        let encoded = LzmaCodec.encode(&data, 6).unwrap();
        assert!(encoded.len() < 200, "expected strong compression of repetitive data, got {} bytes", encoded.len());
    }

    #[test]
    fn lzma_decode_rejects_truncated_block() {
        let data = b"some data to compress".repeat(10);
        let encoded = LzmaCodec.encode(&data, 6).unwrap();
        let truncated = &encoded[..encoded.len() / 2];
        assert!(LzmaCodec.decode(truncated).is_err());
    }

    #[test]
    fn deflate_decode_rejects_garbage() {
        let garbage = vec![0xffu8; 64];
        assert!(DeflateCodec.decode(&garbage).is_err());
    }
}
