//! Share sources: everything that can hand Qards or vaults to a recovery
//! session
//!
//! Each source turns raw input (typed text, one decoded QR frame, a card
//! read, a file) into zero or more `Ingest` items. Sources never touch the
//! working set themselves.

use tracing::{debug, info};

use seqrets_card::{CardService, CardTransport};
use seqrets_chunks::{ChunkAssembler, PushOutcome, TEXT_PREFIX};
use seqrets_core::{CardData, DataType, SeqretsError, SeqretsResult, Share, ShareError};
use seqrets_crypto::EncryptedVaultFile;

/// One decoded item ready for the working set
#[derive(Debug, Clone)]
pub enum Ingest {
    Share(Share),
    Vault(Box<EncryptedVaultFile>),
}

/// Narrow ingestion interface shared by every input path.
pub trait ShareSource {
    /// Short name used in logs.
    fn name(&self) -> &'static str;
    /// Decode one unit of input. May yield nothing yet (e.g. a partial QR
    /// sequence).
    fn submit(&mut self, input: &[u8]) -> SeqretsResult<Vec<Ingest>>;
}

fn utf8(input: &[u8]) -> SeqretsResult<&str> {
    std::str::from_utf8(input)
        .map_err(|_| ShareError::CorruptShareEncoding("input is not UTF-8 text".into()).into())
}

pub(crate) fn is_chunk_text(text: &str) -> bool {
    text.starts_with(TEXT_PREFIX) && text[TEXT_PREFIX.len()..].starts_with(':')
}

/// Classify a JSON document as a share or a vault file.
pub fn parse_item(text: &str) -> SeqretsResult<Ingest> {
    let text = text.trim();
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        ShareError::CorruptShareEncoding(format!("not a share or vault: {e}"))
    })?;

    if value.get("sharing").is_some() && value.get("ciphertext").is_some() {
        return Ok(Ingest::Vault(Box::new(EncryptedVaultFile::from_json(text)?)));
    }
    if value.get("payload").is_some() && value.get("index").is_some() {
        return Ok(Ingest::Share(Share::from_json(text)?));
    }
    Err(ShareError::CorruptShareEncoding("JSON is neither a share nor a vault".into()).into())
}

// ── Manual entry ──────────────────────────────────────────────────────────────

/// Text typed or pasted by the user: one share or vault JSON document.
#[derive(Debug, Default)]
pub struct ManualEntry;

impl ShareSource for ManualEntry {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn submit(&mut self, input: &[u8]) -> SeqretsResult<Vec<Ingest>> {
        let text = utf8(input)?.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![parse_item(text)?])
    }
}

// ── Camera ────────────────────────────────────────────────────────────────────

/// Decoded QR frames from a camera. Chunked payloads are buffered until the
/// sequence completes; a frame holding bare JSON is decoded directly.
#[derive(Debug, Default)]
pub struct CameraFeed {
    assembler: ChunkAssembler,
}

impl CameraFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(received, total)` for the sequence in progress.
    pub fn progress(&self) -> (usize, Option<u32>) {
        self.assembler.progress()
    }

    /// Drop a half-scanned sequence.
    pub fn reset(&mut self) {
        self.assembler.reset();
    }
}

impl ShareSource for CameraFeed {
    fn name(&self) -> &'static str {
        "camera"
    }

    fn submit(&mut self, input: &[u8]) -> SeqretsResult<Vec<Ingest>> {
        let text = utf8(input)?.trim();
        if !is_chunk_text(text) {
            return Ok(vec![parse_item(text)?]);
        }

        if self.assembler.push_text(text)? == PushOutcome::Duplicate {
            return Ok(Vec::new());
        }
        if !self.assembler.is_complete() {
            let (received, total) = self.assembler.progress();
            debug!(received, ?total, "waiting for more QR frames");
            return Ok(Vec::new());
        }

        let bytes = self.assembler.finish()?;
        self.assembler.reset();
        let text = utf8(&bytes)?;
        info!(len = bytes.len(), "QR sequence complete");
        Ok(vec![parse_item(text)?])
    }
}

// ── Card ──────────────────────────────────────────────────────────────────────

/// Data read from a smart card. Input is a serialized `CardData`.
#[derive(Debug, Default)]
pub struct CardImport;

impl CardImport {
    /// Decode what a card read returned.
    pub fn from_card_data(&mut self, data: &CardData) -> SeqretsResult<Vec<Ingest>> {
        match data.data_type {
            DataType::Empty => {
                debug!("card is empty, nothing to import");
                Ok(Vec::new())
            }
            DataType::Share => Ok(vec![Ingest::Share(Share::from_json(&data.data)?)]),
            DataType::Vault => Ok(vec![Ingest::Vault(Box::new(
                EncryptedVaultFile::from_json(&data.data)?,
            ))]),
        }
    }

    /// Read `reader` through the card service and decode the result.
    pub async fn fetch<T: CardTransport + Clone + Sync + 'static>(
        &mut self,
        service: &CardService<T>,
        reader: &str,
    ) -> SeqretsResult<Vec<Ingest>> {
        let data = service.read_card(reader).await?;
        self.from_card_data(&data)
    }
}

impl ShareSource for CardImport {
    fn name(&self) -> &'static str {
        "card"
    }

    fn submit(&mut self, input: &[u8]) -> SeqretsResult<Vec<Ingest>> {
        let data: CardData = serde_json::from_slice(input)
            .map_err(|e| SeqretsError::Format(format!("not card data: {e}")))?;
        self.from_card_data(&data)
    }
}

// ── Files ─────────────────────────────────────────────────────────────────────

/// File contents. Accepted layouts:
/// - one or more share or vault JSON documents, compact or pretty-printed
/// - a JSON array of them
/// - lines holding one-line JSON documents and `SQR1:` frames of any number
///   of chunked payloads, one payload after another; `#` lines are comments
#[derive(Debug, Default)]
pub struct FileImport;

/// Back-to-back JSON documents. The first malformed one fails the file.
fn json_documents(text: &str) -> SeqretsResult<Vec<Ingest>> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<serde_json::Value>()
        .map(|doc| {
            let doc = doc.map_err(|e| {
                ShareError::CorruptShareEncoding(format!("bad JSON document: {e}"))
            })?;
            parse_item(&doc.to_string())
        })
        .collect()
}

fn line_items(text: &str) -> SeqretsResult<Vec<Ingest>> {
    let mut items = Vec::new();
    let mut frames = ChunkAssembler::new();

    for line in text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
    {
        if !is_chunk_text(line) {
            items.push(parse_item(line)?);
            continue;
        }
        frames.push_text(line)?;
        if frames.is_complete() {
            let bytes = frames.finish()?;
            frames.reset();
            items.push(parse_item(utf8(&bytes)?)?);
        }
    }

    let (received, total) = frames.progress();
    if received > 0 {
        debug!(received, ?total, "file ends inside a QR sequence");
        frames.finish()?;
    }
    Ok(items)
}

impl ShareSource for FileImport {
    fn name(&self) -> &'static str {
        "file"
    }

    fn submit(&mut self, input: &[u8]) -> SeqretsResult<Vec<Ingest>> {
        let text = utf8(input)?.trim();
        if text.is_empty() {
            return Err(ShareError::CorruptShareEncoding("file is empty".into()).into());
        }

        if text.starts_with('[') {
            let items: Vec<serde_json::Value> = serde_json::from_str(text).map_err(|e| {
                ShareError::CorruptShareEncoding(format!("bad JSON array: {e}"))
            })?;
            return items
                .iter()
                .map(|v| parse_item(&v.to_string()))
                .collect();
        }
        if text.starts_with('{') {
            return json_documents(text);
        }
        line_items(text)
    }
}
