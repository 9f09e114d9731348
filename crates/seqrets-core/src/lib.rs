//! seqrets-core: shared types, configuration schema, and error taxonomy

pub mod config;
pub mod error;
pub mod plan;
pub mod types;

pub use error::{
    CardError, ChunkError, CryptoError, ParameterError, SeqretsError, SeqretsResult, ShareError,
};
pub use types::{
    CardData, CardStatus, DataType, RawInstruction, ReaderState, SessionId, Share, ShareView,
    SESSION_ID_LEN,
};
