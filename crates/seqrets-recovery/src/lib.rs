//! seqrets-recovery: bringing Qards back together
//!
//! - `source`: `ShareSource` implementations (manual, camera, card, file)
//! - `session`: the working set and `restore`
//! - `scan`: cancellable QR scan loop
//! - `protect`: sealing an instruction into a vault plus Qards

pub mod protect;
pub mod scan;
pub mod session;
pub mod source;

pub use protect::{qard_frames, seal_instruction, SealOptions};
pub use scan::{scan_chunks, ScanOutcome};
pub use session::{
    AddOutcome, RecoverySession, RestoreSecretResult, RestoreStatus, SetHeader, SubmitReport,
};
pub use source::{parse_item, CameraFeed, CardImport, FileImport, Ingest, ManualEntry, ShareSource};
