//! Size-bounded, checksummed chunks for QR transport
//!
//! Text form, one per QR code:
//! ```text
//! SQR1:<sequence index>:<total chunks>:<checksum hex>:<base64 bytes>
//! ```
//! Indices run `0..total`. Chunks may arrive in any order; `decode` and
//! `ChunkAssembler` put them back in sequence.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use seqrets_core::types::serde_base64;
use seqrets_core::{ChunkError, ParameterError, SeqretsError, SeqretsResult};

use crate::assembler::ChunkAssembler;
use crate::blake3::{checksum, checksum_from_hex, checksum_to_hex, Checksum};

/// Prefix identifying version 1 of the chunk text form
pub const TEXT_PREFIX: &str = "SQR1";

/// One fragment of a larger byte sequence
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub sequence_index: u32,
    pub total_chunks: u32,
    #[serde(with = "hex_checksum")]
    pub checksum: Checksum,
    #[serde(with = "serde_base64")]
    pub bytes: Vec<u8>,
}

impl Chunk {
    /// Build a chunk, stamping the checksum of `bytes`.
    pub fn new(sequence_index: u32, total_chunks: u32, bytes: Vec<u8>) -> Self {
        Self {
            sequence_index,
            total_chunks,
            checksum: checksum(&bytes),
            bytes,
        }
    }

    /// Check the payload against the stamped checksum.
    pub fn verify(&self) -> Result<(), ChunkError> {
        if checksum(&self.bytes) != self.checksum {
            return Err(ChunkError::ChecksumFailed {
                index: self.sequence_index,
            });
        }
        Ok(())
    }

    pub fn to_text(&self) -> String {
        format!(
            "{TEXT_PREFIX}:{}:{}:{}:{}",
            self.sequence_index,
            self.total_chunks,
            checksum_to_hex(&self.checksum),
            STANDARD.encode(&self.bytes)
        )
    }

    /// Parse the text form. The checksum is not verified here.
    pub fn from_text(text: &str) -> Result<Self, ChunkError> {
        let text = text.trim();
        let mut parts = text.splitn(5, ':');
        let (Some(prefix), Some(index), Some(total), Some(sum), Some(body)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(ChunkError::Malformed("expected 5 ':'-separated fields".into()));
        };

        if prefix != TEXT_PREFIX {
            return Err(ChunkError::Malformed(format!("unknown prefix '{prefix}'")));
        }
        let sequence_index: u32 = index
            .parse()
            .map_err(|_| ChunkError::Malformed(format!("bad sequence index '{index}'")))?;
        let total_chunks: u32 = total
            .parse()
            .map_err(|_| ChunkError::Malformed(format!("bad chunk total '{total}'")))?;
        if total_chunks == 0 || sequence_index >= total_chunks {
            return Err(ChunkError::Malformed(format!(
                "sequence index {sequence_index} outside 0..{total_chunks}"
            )));
        }

        let bytes = STANDARD
            .decode(body)
            .map_err(|e| ChunkError::Malformed(format!("chunk body is not base64: {e}")))?;

        Ok(Self {
            sequence_index,
            total_chunks,
            checksum: checksum_from_hex(sum)?,
            bytes,
        })
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Chunk {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("sequence_index", &self.sequence_index)
            .field("total_chunks", &self.total_chunks)
            .field("checksum", &checksum_to_hex(&self.checksum))
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .finish()
    }
}

/// Split `data` into ordered chunks of at most `max_chunk_size` bytes.
///
/// Empty input yields a single empty chunk so the receiver still learns the
/// total.
pub fn encode(data: &[u8], max_chunk_size: usize) -> SeqretsResult<Vec<Chunk>> {
    if max_chunk_size == 0 {
        return Err(ParameterError::ZeroChunkSize.into());
    }
    if data.is_empty() {
        return Ok(vec![Chunk::new(0, 1, Vec::new())]);
    }

    let pieces: Vec<&[u8]> = data.chunks(max_chunk_size).collect();
    let total = u32::try_from(pieces.len()).map_err(|_| {
        SeqretsError::Format(format!("{} chunks exceed the sequence range", pieces.len()))
    })?;

    let chunks: Vec<Chunk> = pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk::new(i as u32, total, piece.to_vec()))
        .collect();

    debug!(len = data.len(), max_chunk_size, total, "encoded chunks");
    Ok(chunks)
}

/// `encode`, rendered to text for QR generation.
pub fn encode_text(data: &[u8], max_chunk_size: usize) -> SeqretsResult<Vec<String>> {
    Ok(encode(data, max_chunk_size)?
        .iter()
        .map(Chunk::to_text)
        .collect())
}

/// Reassemble chunks supplied in any order.
///
/// Checksums are verified up front in parallel; the lowest failing index is
/// reported.
pub fn decode(chunks: &[Chunk]) -> Result<Vec<u8>, ChunkError> {
    if let Some(index) = chunks
        .par_iter()
        .filter(|c| c.verify().is_err())
        .map(|c| c.sequence_index)
        .min()
    {
        return Err(ChunkError::ChecksumFailed { index });
    }

    let mut assembler = ChunkAssembler::new();
    for chunk in chunks {
        assembler.push_verified(chunk.clone())?;
    }
    assembler.finish()
}

/// Parse and reassemble the text form.
pub fn decode_text<S: AsRef<str>>(texts: &[S]) -> Result<Vec<u8>, ChunkError> {
    let chunks = texts
        .iter()
        .map(|t| Chunk::from_text(t.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    decode(&chunks)
}

mod hex_checksum {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::blake3::{checksum_from_hex, checksum_to_hex, Checksum};

    pub fn serialize<S: Serializer>(sum: &Checksum, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&checksum_to_hex(sum))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Checksum, D::Error> {
        let s = String::deserialize(deserializer)?;
        checksum_from_hex(&s).map_err(serde::de::Error::custom)
    }
}
