use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{SeqretsError, SeqretsResult, ShareError};

/// Current share payload layout version
pub const SHARE_PAYLOAD_VERSION: u8 = 1;

/// Length of the sharing-session identifier embedded in every share
pub const SESSION_ID_LEN: usize = 16;

/// Truncated BLAKE3 checksum appended to every share payload
pub const SHARE_CHECKSUM_LEN: usize = 8;

/// version + session id + threshold + total + index
const SHARE_HEADER_LEN: usize = 1 + SESSION_ID_LEN + 3;

/// Identifier shared by every share produced by one `split` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    pub fn from_bytes(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> SeqretsResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| SeqretsError::Format(format!("invalid session id '{s}': {e}")))?;
        let arr: [u8; SESSION_ID_LEN] = bytes.try_into().map_err(|_| {
            SeqretsError::Format(format!("session id must be {SESSION_ID_LEN} bytes"))
        })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One Shamir share ("Qard").
///
/// Payload layout:
/// ```text
/// [1: version][16: session id][1: threshold][1: total][1: index][N: y values][8: blake3 prefix]
/// ```
/// The header fields are duplicated outside the payload so a share can be
/// inspected without decoding it; `validate` checks that both agree.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    index: u8,
    threshold: u8,
    total_shares: u8,
    #[serde(with = "serde_base64")]
    payload: Vec<u8>,
    label: String,
}

/// A structurally validated view into a share payload.
#[derive(Debug, Clone, Copy)]
pub struct ShareView<'a> {
    pub session_id: SessionId,
    pub index: u8,
    pub threshold: u8,
    pub total_shares: u8,
    pub values: &'a [u8],
}

impl Share {
    /// Assemble a share from its evaluated y values, stamping the payload
    /// header and checksum.
    pub fn from_parts(
        session_id: SessionId,
        threshold: u8,
        total_shares: u8,
        index: u8,
        values: &[u8],
        label: impl Into<String>,
    ) -> Self {
        let mut payload = Vec::with_capacity(SHARE_HEADER_LEN + values.len() + SHARE_CHECKSUM_LEN);
        payload.push(SHARE_PAYLOAD_VERSION);
        payload.extend_from_slice(session_id.as_bytes());
        payload.push(threshold);
        payload.push(total_shares);
        payload.push(index);
        payload.extend_from_slice(values);
        let digest = blake3::hash(&payload);
        payload.extend_from_slice(&digest.as_bytes()[..SHARE_CHECKSUM_LEN]);

        Self {
            index,
            threshold,
            total_shares,
            payload,
            label: label.into(),
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn total_shares(&self) -> u8 {
        self.total_shares
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Check the payload against its checksum and the outer header.
    pub fn validate(&self) -> Result<ShareView<'_>, ShareError> {
        let corrupt = |msg: String| ShareError::CorruptShareEncoding(msg);

        if self.payload.len() < SHARE_HEADER_LEN + 1 + SHARE_CHECKSUM_LEN {
            return Err(corrupt(format!(
                "share #{} payload too short: {} bytes",
                self.index,
                self.payload.len()
            )));
        }

        let (body, checksum) = self.payload.split_at(self.payload.len() - SHARE_CHECKSUM_LEN);
        let digest = blake3::hash(body);
        if &digest.as_bytes()[..SHARE_CHECKSUM_LEN] != checksum {
            return Err(corrupt(format!("share #{} checksum mismatch", self.index)));
        }

        if body[0] != SHARE_PAYLOAD_VERSION {
            return Err(corrupt(format!(
                "share #{} has unsupported payload version {}",
                self.index, body[0]
            )));
        }

        let mut session = [0u8; SESSION_ID_LEN];
        session.copy_from_slice(&body[1..1 + SESSION_ID_LEN]);
        let threshold = body[1 + SESSION_ID_LEN];
        let total_shares = body[2 + SESSION_ID_LEN];
        let index = body[3 + SESSION_ID_LEN];

        if (threshold, total_shares, index) != (self.threshold, self.total_shares, self.index) {
            return Err(corrupt(format!(
                "share #{} header ({}-of-{}) disagrees with payload (#{index}, {threshold}-of-{total_shares})",
                self.index, self.threshold, self.total_shares
            )));
        }
        if index == 0 || threshold == 0 || threshold > total_shares || index > total_shares {
            return Err(corrupt(format!(
                "share #{index} has impossible header {threshold}-of-{total_shares}"
            )));
        }

        Ok(ShareView {
            session_id: SessionId::from_bytes(session),
            index,
            threshold,
            total_shares,
            values: &body[SHARE_HEADER_LEN..],
        })
    }

    /// Session identifier embedded in the payload.
    pub fn session_id(&self) -> Result<SessionId, ShareError> {
        self.validate().map(|v| v.session_id)
    }

    /// Serialize to the JSON form stored on cards and in share files.
    pub fn to_json(&self) -> SeqretsResult<String> {
        serde_json::to_string(self)
            .map_err(|e| SeqretsError::Format(format!("share serialization: {e}")))
    }

    /// Parse and validate a share from its JSON text form.
    pub fn from_json(text: &str) -> SeqretsResult<Self> {
        let share: Share = serde_json::from_str(text.trim()).map_err(|e| {
            ShareError::CorruptShareEncoding(format!("share is not valid JSON: {e}"))
        })?;
        share.validate()?;
        Ok(share)
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("total_shares", &self.total_shares)
            .field("payload", &format_args!("[{} bytes]", self.payload.len()))
            .field("label", &self.label)
            .finish()
    }
}

/// Opaque file payload protected by the instruction cipher.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstruction {
    pub file_name: String,
    /// Base64 (standard alphabet) file contents
    pub file_content: String,
    pub file_type: String,
}

impl RawInstruction {
    pub fn from_bytes(
        file_name: impl Into<String>,
        content: &[u8],
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_content: STANDARD.encode(content),
            file_type: file_type.into(),
        }
    }

    /// Decode the base64 file contents.
    pub fn content_bytes(&self) -> SeqretsResult<Vec<u8>> {
        STANDARD
            .decode(&self.file_content)
            .map_err(|e| SeqretsError::Format(format!("instruction content is not base64: {e}")))
    }
}

impl std::fmt::Debug for RawInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawInstruction")
            .field("file_name", &self.file_name)
            .field("file_content", &"[REDACTED]")
            .field("file_type", &self.file_type)
            .finish()
    }
}

/// What a card's storage slot currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Share,
    Vault,
    Empty,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Share => "share",
            DataType::Vault => "vault",
            DataType::Empty => "empty",
        };
        f.write_str(s)
    }
}

/// Protocol state of one reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderState {
    /// No card in the reader
    Disconnected,
    /// Card present and usable
    Connected,
    /// PIN attempts exhausted; only an out-of-band reset recovers the card
    Blocked,
}

/// Snapshot of a card's state, computed fresh from the token on each query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStatus {
    pub state: ReaderState,
    pub has_data: bool,
    pub data_length: usize,
    pub data_type: DataType,
    pub label: String,
    pub pin_set: bool,
    pub pin_verified: bool,
    pub attempts_remaining: u8,
}

impl CardStatus {
    pub fn disconnected() -> Self {
        Self {
            state: ReaderState::Disconnected,
            has_data: false,
            data_length: 0,
            data_type: DataType::Empty,
            label: String::new(),
            pin_set: false,
            pin_verified: false,
            attempts_remaining: 0,
        }
    }
}

/// Payload read back from a card
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub data: String,
    pub data_type: DataType,
    pub label: String,
}

impl std::fmt::Debug for CardData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardData")
            .field("data", &format_args!("[{} bytes]", self.data.len()))
            .field("data_type", &self.data_type)
            .field("label", &self.label)
            .finish()
    }
}

/// Serde adapter storing byte vectors as standard base64 strings.
pub mod serde_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
