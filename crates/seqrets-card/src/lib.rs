//! seqrets-card: smart-card storage for Qards and vaults
//!
//! - `transport`: raw image I/O (`CardTransport`), in-memory and
//!   file-backed emulators
//! - `image`: on-token JSON layout, PIN records
//! - `protocol`: PIN state machine and data commands (`CardProtocol`)
//! - `service`: async wrapper running commands on the blocking pool

pub mod image;
pub mod protocol;
pub mod service;
pub mod transport;

pub use image::{CardImage, PinRecord, StoredData, CARD_IMAGE_VERSION};
pub use protocol::{CardPolicy, CardProtocol, CardSessions, MAX_PIN_LEN, MIN_PIN_LEN};
pub use service::CardService;
pub use transport::{CardTransport, FileTransport, MemoryTransport};
