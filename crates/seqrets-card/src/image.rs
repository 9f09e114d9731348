//! Token storage layout
//!
//! Everything lives in one JSON document so the PIN attempt counter is
//! persisted on the token itself and survives reconnection.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use seqrets_core::{CardError, DataType};

pub const CARD_IMAGE_VERSION: u32 = 1;

const PIN_CONTEXT: &str = "seqrets 2024 card pin v1";
const PIN_SALT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardImage {
    pub version: u32,
    pub card_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<PinRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StoredData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRecord {
    /// Hex salt
    pub salt: String,
    /// Hex BLAKE3 derive-key over salt || PIN
    pub hash: String,
    pub failed_attempts: u8,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredData {
    pub data_type: DataType,
    pub label: String,
    pub data: String,
}

impl std::fmt::Debug for StoredData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredData")
            .field("data_type", &self.data_type)
            .field("label", &self.label)
            .field("data", &format_args!("[{} bytes]", self.data.len()))
            .finish()
    }
}

impl CardImage {
    /// A fresh image with a new card id, no PIN and no data.
    pub fn blank() -> Self {
        Self {
            version: CARD_IMAGE_VERSION,
            card_id: uuid::Uuid::new_v4().to_string(),
            pin: None,
            data: None,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CardError> {
        let image: CardImage = serde_json::from_slice(bytes)
            .map_err(|e| CardError::Corrupt(format!("card image is not valid JSON: {e}")))?;
        if image.version != CARD_IMAGE_VERSION {
            return Err(CardError::Corrupt(format!(
                "unsupported card image version {}",
                image.version
            )));
        }
        Ok(image)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CardError> {
        serde_json::to_vec(self)
            .map_err(|e| CardError::Corrupt(format!("card image serialization: {e}")))
    }
}

fn pin_digest(salt: &[u8], pin: &str) -> blake3::Hash {
    let mut material = Vec::with_capacity(salt.len() + pin.len());
    material.extend_from_slice(salt);
    material.extend_from_slice(pin.as_bytes());
    let digest = blake3::derive_key(PIN_CONTEXT, &material);
    zeroize::Zeroize::zeroize(&mut material);
    blake3::Hash::from(digest)
}

impl PinRecord {
    pub fn new(pin: &str) -> Self {
        let mut salt = [0u8; PIN_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            salt: hex::encode(salt),
            hash: pin_digest(&salt, pin).to_hex().to_string(),
            failed_attempts: 0,
        }
    }

    /// Constant-time check of `pin` against the stored hash.
    pub fn matches(&self, pin: &str) -> Result<bool, CardError> {
        let salt = hex::decode(&self.salt)
            .map_err(|e| CardError::Corrupt(format!("PIN salt is not hex: {e}")))?;
        let stored = blake3::Hash::from_hex(&self.hash)
            .map_err(|e| CardError::Corrupt(format!("PIN hash is not hex: {e}")))?;
        // blake3::Hash equality is constant-time
        Ok(pin_digest(&salt, pin) == stored)
    }
}
