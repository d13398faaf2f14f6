//! The QPK binary container: fixed header, index table, payload blocks,
//! trailing manifest block (§4.G/H).

pub mod reader;
pub mod writer;

pub use reader::{QpkHandle, QpkReader};
pub use writer::QpkWriter;

/// ASCII `QPK\0`.
pub const MAGIC: [u8; 4] = [0x51, 0x50, 0x4B, 0x00];
pub const FORMAT_VERSION: u32 = 1;

/// Fixed header size: magic(4) + format_version(4) + compression_algo(4) +
/// encryption_flags(4) + file_count(4) + manifest_offset(8) +
/// manifest_stored_size(8) + manifest_raw_size(8) + payload_offset(8) +
/// reserved(16).
pub const HEADER_SIZE: u64 = 4 + 4 + 4 + 4 + 4 + 8 + 8 + 8 + 8 + 16;

/// One index-table entry: path_hash(16) + offset(8) + stored_size(8) +
/// raw_size(8) + flags(4) + reserved(4).
pub const INDEX_ENTRY_SIZE: u64 = 16 + 8 + 8 + 8 + 4 + 4;

pub const FLAG_COMPRESSED: u32 = 0b01;
pub const FLAG_ENCRYPTED: u32 = 0b10;

/// Computes `path_hash`: the first 16 bytes of `SHA-256(relative_path || 0x00 || locale)`.
pub fn path_hash(relative_path: &str, locale: &str) -> [u8; 16] {
    let digest = crate::hash::hash_bytes({
        let mut buf = Vec::with_capacity(relative_path.len() + 1 + locale.len());
        buf.extend_from_slice(relative_path.as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(locale.as_bytes());
        &buf
    });
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub format_version: u32,
    pub compression_algo: u32,
    pub encryption_flags: u32,
    pub file_count: u32,
    pub manifest_offset: u64,
    pub manifest_stored_size: u64,
    pub manifest_raw_size: u64,
    pub payload_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawIndexEntry {
    pub path_hash: [u8; 16],
    pub offset: u64,
    pub stored_size: u64,
    pub raw_size: u64,
    pub flags: u32,
}
