//! Forward path: protect an instruction and hand out Qards

use secrecy::SecretString;
use tracing::info;

use seqrets_chunks::encode_text;
use seqrets_core::config::SeqretsConfig;
use seqrets_core::{RawInstruction, SeqretsResult, Share};
use seqrets_crypto::{seal, ExportedVault, KdfParams};

/// Sharing layout and KDF cost for a new vault
#[derive(Debug, Clone)]
pub struct SealOptions {
    pub threshold: usize,
    pub total_shares: usize,
    pub label: String,
    pub kdf: KdfParams,
}

impl SealOptions {
    pub fn from_config(config: &SeqretsConfig) -> Self {
        Self {
            threshold: config.sharing.default_threshold as usize,
            total_shares: config.sharing.default_total_shares as usize,
            label: config.sharing.default_label.clone(),
            kdf: KdfParams::from(&config.crypto),
        }
    }
}

/// Encrypt `instruction` under a fresh share key and split that key.
pub fn seal_instruction(
    instruction: &RawInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
    options: &SealOptions,
) -> SeqretsResult<ExportedVault> {
    let exported = seal(
        instruction,
        password,
        keyfile,
        options.threshold,
        options.total_shares,
        &options.label,
        &options.kdf,
    )?;
    info!(
        file = %instruction.file_name,
        keyfile = keyfile.is_some(),
        qards = exported.shares.len(),
        "instruction sealed"
    );
    Ok(exported)
}

/// QR frame texts for one Qard.
pub fn qard_frames(share: &Share, max_chunk_size: usize) -> SeqretsResult<Vec<String>> {
    encode_text(share.to_json()?.as_bytes(), max_chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{RecoverySession, RestoreStatus};
    use crate::source::{CameraFeed, ShareSource};

    #[test]
    fn options_follow_config() {
        let mut config = SeqretsConfig::default();
        config.sharing.default_threshold = 3;
        config.sharing.default_total_shares = 5;
        let opts = SealOptions::from_config(&config);
        assert_eq!((opts.threshold, opts.total_shares), (3, 5));
        assert_eq!(opts.kdf, KdfParams::from(&config.crypto));
    }

    #[test]
    fn sealed_qards_scan_back() {
        let inst = RawInstruction::from_bytes("seed.txt", b"abandon abandon about", "text/plain");
        let opts = SealOptions {
            threshold: 2,
            total_shares: 3,
            label: "family".into(),
            kdf: KdfParams::insecure_fast(),
        };
        let password = SecretString::from("correct horse".to_string());
        let exported = seal_instruction(&inst, &password, Some(&b"keyfile"[..]), &opts).unwrap();

        let mut session = RecoverySession::new();
        session.attach_vault(exported.vault.clone()).unwrap();
        let mut camera = CameraFeed::new();
        for share in &exported.shares[1..] {
            for frame in qard_frames(share, 48).unwrap() {
                session.submit(&mut camera, frame.as_bytes()).unwrap();
            }
        }

        let result = session.restore(Some(&password), Some(&b"keyfile"[..]));
        assert_eq!(result.status, RestoreStatus::InstructionDecrypted);
        assert_eq!(result.instruction.unwrap(), inst);

        let no_keyfile = session.restore(Some(&password), None);
        assert_eq!(no_keyfile.status, RestoreStatus::Failed);
    }
}
