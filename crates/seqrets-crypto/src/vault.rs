//! Vault files: an encrypted instruction plus the sharing metadata of the
//! Qards that unlock it.
//!
//! Sealing draws a random share key, binds it into the instruction key and
//! splits it. Opening needs the password, the keyfile if one was used, and
//! `threshold` of the shares.

use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use seqrets_core::{
    ParameterError, RawInstruction, SeqretsError, SeqretsResult, SessionId, Share, ShareError,
    SESSION_ID_LEN,
};

use crate::cipher::{decrypt_bound, encrypt_bound, EncryptedInstruction};
use crate::kdf::KdfParams;
use crate::keys::generate_share_key;
use crate::shamir::{reconstruct, split_with_session, MAX_SHARES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingMetadata {
    pub threshold: u8,
    pub total_shares: u8,
    pub label: String,
    /// Hex session id shared by every Qard of this vault
    pub session_id: String,
}

/// On-disk vault: instruction fields flattened next to `sharing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVaultFile {
    #[serde(flatten)]
    pub instruction: EncryptedInstruction,
    pub sharing: SharingMetadata,
}

impl EncryptedVaultFile {
    pub fn to_json(&self) -> SeqretsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SeqretsError::Format(format!("vault serialization: {e}")))
    }

    pub fn from_json(text: &str) -> SeqretsResult<Self> {
        serde_json::from_str(text.trim())
            .map_err(|e| SeqretsError::Format(format!("not a vault file: {e}")))
    }

    pub fn session_id(&self) -> SeqretsResult<SessionId> {
        SessionId::from_hex(&self.sharing.session_id)
    }

    /// Check that a share belongs to this vault.
    pub fn check_share(&self, share: &Share) -> Result<(), ShareError> {
        let view = share.validate()?;
        let meta = &self.sharing;
        if (view.threshold, view.total_shares) != (meta.threshold, meta.total_shares) {
            return Err(ShareError::IncompatibleShare(format!(
                "share #{} is {}-of-{}, vault expects {}-of-{}",
                view.index, view.threshold, view.total_shares, meta.threshold, meta.total_shares
            )));
        }
        if view.session_id.to_hex() != meta.session_id.to_ascii_lowercase() {
            return Err(ShareError::IncompatibleShare(format!(
                "share #{} does not belong to vault '{}'",
                view.index, meta.label
            )));
        }
        Ok(())
    }
}

/// Result of sealing: the vault file and the Qards for it
#[derive(Debug, Clone)]
pub struct ExportedVault {
    pub vault: EncryptedVaultFile,
    pub shares: Vec<Share>,
}

/// Encrypt `instruction` and split the share key into `total` Qards.
pub fn seal(
    instruction: &RawInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
    threshold: usize,
    total: usize,
    label: &str,
    params: &KdfParams,
) -> SeqretsResult<ExportedVault> {
    if threshold < 1 || threshold > total || total > MAX_SHARES {
        return Err(ParameterError::InvalidParameters { threshold, total }.into());
    }

    let mut session = [0u8; SESSION_ID_LEN];
    rand::thread_rng().fill_bytes(&mut session);
    let session = SessionId::from_bytes(session);

    let share_key = generate_share_key();
    let encrypted = encrypt_bound(instruction, password, keyfile, &share_key, params)?;
    let shares = split_with_session(share_key.as_bytes(), threshold, total, label, session)?;

    info!(threshold, total, label, session = %session, "vault sealed");
    Ok(ExportedVault {
        vault: EncryptedVaultFile {
            instruction: encrypted,
            sharing: SharingMetadata {
                threshold: threshold as u8,
                total_shares: total as u8,
                label: label.to_string(),
                session_id: session.to_hex(),
            },
        },
        shares,
    })
}

/// Reconstruct the share key from `shares` and decrypt the vault.
pub fn open(
    vault: &EncryptedVaultFile,
    shares: &[Share],
    password: &SecretString,
    keyfile: Option<&[u8]>,
) -> SeqretsResult<RawInstruction> {
    for share in shares {
        vault.check_share(share)?;
    }
    let share_key = reconstruct(shares)?;
    decrypt_bound(&vault.instruction, password, keyfile, &share_key)
}
