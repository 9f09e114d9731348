//! Cooperative QR scan loop
//!
//! The camera collaborator pushes decoded frame text into a channel. The
//! loop yields to the runtime on every tick so it never starves the UI task,
//! and a cancellation token stops it between frames.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use seqrets_chunks::{ChunkAssembler, PushOutcome};

use crate::source::is_chunk_text;

#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Reassembled payload (or the text of a single unchunked frame)
    Complete(Vec<u8>),
    Cancelled,
    /// Sender dropped before the sequence completed
    Closed,
}

/// Consume frames until a payload is complete, the token fires or the
/// channel closes. Unreadable frames are skipped.
pub async fn scan_chunks(
    frames: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> ScanOutcome {
    let mut assembler = ChunkAssembler::new();

    loop {
        tokio::task::yield_now().await;

        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(received = assembler.progress().0, "QR scan cancelled");
                return ScanOutcome::Cancelled;
            }
            frame = frames.recv() => frame,
        };

        let Some(frame) = frame else {
            debug!("QR frame channel closed");
            return ScanOutcome::Closed;
        };
        let text = frame.trim();

        if !is_chunk_text(text) {
            if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                info!(len = text.len(), "single-frame QR payload");
                return ScanOutcome::Complete(text.as_bytes().to_vec());
            }
            debug!("ignoring non-seqrets QR frame");
            continue;
        }

        match assembler.push_text(text) {
            Ok(PushOutcome::Accepted) => {}
            Ok(PushOutcome::Duplicate) => continue,
            Err(e) => {
                warn!(error = %e, "skipping unreadable QR frame");
                continue;
            }
        }

        let (received, total) = assembler.progress();
        debug!(received, ?total, "QR frame accepted");

        if assembler.is_complete() {
            match assembler.finish() {
                Ok(bytes) => {
                    info!(len = bytes.len(), chunks = received, "QR scan complete");
                    return ScanOutcome::Complete(bytes);
                }
                Err(e) => {
                    warn!(error = %e, "reassembly failed, restarting scan");
                    assembler.reset();
                }
            }
        }
    }
}
