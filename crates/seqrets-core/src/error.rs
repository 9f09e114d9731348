use thiserror::Error;

pub type SeqretsResult<T> = Result<T, SeqretsError>;

#[derive(Debug, Error)]
pub enum SeqretsError {
    #[error("parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("share error: {0}")]
    Share(#[from] ShareError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("card error: {0}")]
    Card(#[from] CardError),

    #[error("config error: {0}")]
    Config(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SeqretsError {
    /// Whether the caller can recover by retrying locally (rescanning a QR
    /// code, re-entering a PIN) instead of starting over.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SeqretsError::Chunk(ChunkError::MissingChunk { .. })
                | SeqretsError::Chunk(ChunkError::DuplicateChunkMismatch { .. })
                | SeqretsError::Chunk(ChunkError::ChecksumFailed { .. })
                | SeqretsError::Card(CardError::WrongPin { .. })
                | SeqretsError::Card(CardError::CardRemoved)
                | SeqretsError::Card(CardError::Timeout)
        )
    }
}

/// Bad caller-supplied parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("invalid sharing parameters: threshold {threshold} of {total} (need 1 <= k <= n <= 255)")]
    InvalidParameters { threshold: usize, total: usize },

    #[error("secret is empty")]
    EmptySecret,

    #[error("maximum chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("invalid key derivation parameters: {0}")]
    KdfParams(String),

    #[error("a password is required")]
    MissingPassword,

    #[error("invalid mnemonic: {0}")]
    Mnemonic(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("insufficient shares: need {needed}, have {got}")]
    InsufficientShares { needed: usize, got: usize },

    #[error("conflicting shares for index {index}")]
    ConflictingShares { index: u8 },

    #[error("corrupt share encoding: {0}")]
    CorruptShareEncoding(String),

    #[error("incompatible share: {0}")]
    IncompatibleShare(String),
}

/// Cryptographic failures.
///
/// Decryption deliberately reports every failure as `AuthenticationFailed`
/// so callers cannot tell a wrong password from corrupted data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("authentication failed: wrong password, wrong keyfile, or corrupted data")]
    AuthenticationFailed,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encryption,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("missing chunk {index}")]
    MissingChunk { index: u32 },

    #[error("chunk {index} received twice with different contents")]
    DuplicateChunkMismatch { index: u32 },

    #[error("checksum failed for chunk {index}")]
    ChecksumFailed { index: u32 },

    #[error("chunk total mismatch: expected {expected}, got {got}")]
    TotalMismatch { expected: u32, got: u32 },

    #[error("malformed chunk: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    #[error("PIN verification required")]
    NotVerified,

    #[error("wrong PIN ({remaining} attempts remaining)")]
    WrongPin { remaining: u8 },

    #[error("card is blocked: PIN attempts exhausted")]
    CardBlocked,

    #[error("a PIN is already set on this card")]
    PinAlreadySet,

    #[error("no PIN is set on this card")]
    PinNotSet,

    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    #[error("card full: need {needed} bytes, capacity {capacity}")]
    CardFull { needed: usize, capacity: usize },

    #[error("card removed")]
    CardRemoved,

    #[error("no card present in reader {0}")]
    NoCard(String),

    #[error("unknown reader: {0}")]
    UnknownReader(String),

    #[error("card command timed out")]
    Timeout,

    #[error("card contents unreadable: {0}")]
    Corrupt(String),

    #[error("transport error: {0}")]
    Transport(String),
}
