//! Incremental chunk reassembly for live scanning

use std::collections::BTreeMap;

use tracing::{debug, trace};

use seqrets_core::ChunkError;

use crate::codec::Chunk;

/// What `push` did with a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// New sequence index stored
    Accepted,
    /// Same bytes seen before under this index
    Duplicate,
}

/// Collects chunks of one message as they arrive, in any order.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    total: Option<u32>,
    received: BTreeMap<u32, Vec<u8>>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify and store a chunk.
    pub fn push(&mut self, chunk: Chunk) -> Result<PushOutcome, ChunkError> {
        chunk.verify()?;
        self.push_verified(chunk)
    }

    /// Parse, verify and store the text form of a chunk.
    pub fn push_text(&mut self, text: &str) -> Result<PushOutcome, ChunkError> {
        self.push(Chunk::from_text(text)?)
    }

    pub(crate) fn push_verified(&mut self, chunk: Chunk) -> Result<PushOutcome, ChunkError> {
        if chunk.total_chunks == 0 || chunk.sequence_index >= chunk.total_chunks {
            return Err(ChunkError::Malformed(format!(
                "sequence index {} outside 0..{}",
                chunk.sequence_index, chunk.total_chunks
            )));
        }
        let total = chunk.total_chunks;
        if let Some(expected) = self.total {
            if expected != total {
                return Err(ChunkError::TotalMismatch {
                    expected,
                    got: total,
                });
            }
        }
        self.total = Some(total);

        match self.received.get(&chunk.sequence_index) {
            Some(existing) if *existing != chunk.bytes => Err(ChunkError::DuplicateChunkMismatch {
                index: chunk.sequence_index,
            }),
            Some(_) => {
                trace!(index = chunk.sequence_index, "duplicate chunk ignored");
                Ok(PushOutcome::Duplicate)
            }
            None => {
                debug!(
                    index = chunk.sequence_index,
                    total,
                    received = self.received.len() + 1,
                    "chunk accepted"
                );
                self.received.insert(chunk.sequence_index, chunk.bytes);
                Ok(PushOutcome::Accepted)
            }
        }
    }

    /// `(received, total)`; total is unknown until the first chunk arrives.
    pub fn progress(&self) -> (usize, Option<u32>) {
        (self.received.len(), self.total)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.total, Some(t) if self.received.len() == t as usize)
    }

    /// Concatenate the chunks in sequence order.
    pub fn finish(&self) -> Result<Vec<u8>, ChunkError> {
        let Some(total) = self.total else {
            return Err(ChunkError::MissingChunk { index: 0 });
        };
        // The first gap is at most `received.len()`, so this stops early even
        // for a bogus huge total.
        if let Some(index) = (0..total).find(|i| !self.received.contains_key(i)) {
            return Err(ChunkError::MissingChunk { index });
        }

        let len = self.received.values().map(Vec::len).sum();
        let mut out = Vec::with_capacity(len);
        for bytes in self.received.values() {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    /// Forget everything received so far.
    pub fn reset(&mut self) {
        self.total = None;
        self.received.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    #[test]
    fn progress_and_completion() {
        let data: Vec<u8> = (0..=255).collect();
        let chunks = encode(&data, 100).unwrap();
        let mut asm = ChunkAssembler::new();
        assert_eq!(asm.progress(), (0, None));
        assert!(!asm.is_complete());

        assert_eq!(asm.push(chunks[2].clone()).unwrap(), PushOutcome::Accepted);
        assert_eq!(asm.progress(), (1, Some(3)));
        assert_eq!(asm.finish(), Err(ChunkError::MissingChunk { index: 0 }));

        asm.push(chunks[0].clone()).unwrap();
        assert_eq!(asm.push(chunks[0].clone()).unwrap(), PushOutcome::Duplicate);
        asm.push(chunks[1].clone()).unwrap();

        assert!(asm.is_complete());
        assert_eq!(asm.finish().unwrap(), data);
    }

    #[test]
    fn corrupt_chunk_is_not_stored() {
        let mut chunks = encode(b"hello world", 4).unwrap();
        chunks[1].bytes[0] ^= 0xFF;
        let mut asm = ChunkAssembler::new();
        assert_eq!(
            asm.push(chunks[1].clone()),
            Err(ChunkError::ChecksumFailed { index: 1 })
        );
        assert_eq!(asm.progress(), (0, None));
    }

    #[test]
    fn text_push_and_reset() {
        let chunks = encode(b"abcdef", 3).unwrap();
        let mut asm = ChunkAssembler::new();
        asm.push_text(&chunks[0].to_text()).unwrap();
        asm.reset();
        assert_eq!(asm.progress(), (0, None));

        for c in &chunks {
            asm.push_text(&c.to_text()).unwrap();
        }
        assert_eq!(asm.finish().unwrap(), b"abcdef");
    }

    #[test]
    fn finish_with_nothing_is_missing() {
        assert_eq!(
            ChunkAssembler::new().finish(),
            Err(ChunkError::MissingChunk { index: 0 })
        );
    }
}
