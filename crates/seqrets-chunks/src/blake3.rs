//! BLAKE3 checksums for chunk payloads
//!
//! Each chunk carries the first 8 bytes of the BLAKE3 hash of its own bytes,
//! rendered as 16 hex chars in the text form. Enough to catch a misread QR
//! frame; integrity of the whole message is the cipher's job.

use seqrets_core::ChunkError;

/// Truncated checksum length in bytes
pub const CHECKSUM_LEN: usize = 8;

pub type Checksum = [u8; CHECKSUM_LEN];

/// A full BLAKE3 hash digest (32 bytes)
pub type Hash = blake3::Hash;

/// Hash a byte slice in memory.
pub fn hash_bytes(data: &[u8]) -> Hash {
    blake3::hash(data)
}

/// Truncated BLAKE3 checksum of `data`.
pub fn checksum(data: &[u8]) -> Checksum {
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash_bytes(data).as_bytes()[..CHECKSUM_LEN]);
    out
}

/// Format a checksum as lowercase hex (16 chars)
pub fn checksum_to_hex(sum: &Checksum) -> String {
    hex::encode(sum)
}

/// Parse a 16-char hex checksum
pub fn checksum_from_hex(s: &str) -> Result<Checksum, ChunkError> {
    let bytes =
        hex::decode(s).map_err(|e| ChunkError::Malformed(format!("invalid checksum '{s}': {e}")))?;
    bytes.try_into().map_err(|_| {
        ChunkError::Malformed(format!("checksum must be {CHECKSUM_LEN} bytes, got '{s}'"))
    })
}
