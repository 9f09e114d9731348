//! seqrets-chunks: QR transport codec
//!
//! # Overview
//! - `blake3`: truncated per-chunk checksums
//! - `codec`: `Chunk`, its `SQR1:` text form, one-shot `encode`/`decode`
//! - `assembler`: incremental reassembly for a live camera feed

pub mod assembler;
pub mod blake3;
pub mod codec;

pub use assembler::{ChunkAssembler, PushOutcome};
pub use blake3::{checksum, checksum_from_hex, checksum_to_hex, Checksum, CHECKSUM_LEN};
pub use codec::{decode, decode_text, encode, encode_text, Chunk, TEXT_PREFIX};
