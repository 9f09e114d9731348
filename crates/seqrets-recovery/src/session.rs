//! Recovery working set
//!
//! Qards are collected from any mix of sources until the threshold is met.
//! The first share fixes the set header (session id, threshold, total);
//! anything that disagrees is rejected rather than dropped. Shares are only
//! ever added; `reset` starts over.

use std::collections::BTreeMap;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use seqrets_core::{
    ParameterError, RawInstruction, SeqretsError, SeqretsResult, SessionId, Share, ShareError,
};
use seqrets_crypto::{decrypt_bound, reconstruct, EncryptedVaultFile, Secret};

use crate::source::{Ingest, ShareSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHeader {
    pub session_id: SessionId,
    pub threshold: u8,
    pub total_shares: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Same share seen before
    Duplicate,
}

/// Tally of one `submit` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub shares_added: usize,
    pub duplicates: usize,
    pub vault_attached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    /// Not enough shares yet
    Collecting,
    /// Raw secret reconstructed (no vault attached)
    SecretRecovered,
    /// Vault decrypted with the reconstructed share key
    InstructionDecrypted,
    Failed,
}

/// Outcome of a restore attempt. `error` is a user-facing message and never
/// carries key material.
#[derive(Debug)]
pub struct RestoreSecretResult {
    pub status: RestoreStatus,
    pub instruction: Option<RawInstruction>,
    pub secret: Option<Secret>,
    pub label: Option<String>,
    pub error: Option<String>,
}

impl RestoreSecretResult {
    fn collecting(error: SeqretsError) -> Self {
        Self {
            status: RestoreStatus::Collecting,
            instruction: None,
            secret: None,
            label: None,
            error: Some(error.to_string()),
        }
    }

    fn failed(error: SeqretsError, label: Option<String>) -> Self {
        warn!(error = %error, "restore failed");
        Self {
            status: RestoreStatus::Failed,
            instruction: None,
            secret: None,
            label,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            RestoreStatus::SecretRecovered | RestoreStatus::InstructionDecrypted
        )
    }
}

#[derive(Debug, Default)]
pub struct RecoverySession {
    header: Option<SetHeader>,
    shares: BTreeMap<u8, Share>,
    vault: Option<EncryptedVaultFile>,
}

impl RecoverySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> Option<&SetHeader> {
        self.header.as_ref()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Indices collected so far, ascending.
    pub fn indices(&self) -> Vec<u8> {
        self.shares.keys().copied().collect()
    }

    pub fn shares(&self) -> impl Iterator<Item = &Share> {
        self.shares.values()
    }

    pub fn vault(&self) -> Option<&EncryptedVaultFile> {
        self.vault.as_ref()
    }

    /// Shares still missing before a restore can run.
    pub fn remaining(&self) -> Option<usize> {
        self.header
            .map(|h| (h.threshold as usize).saturating_sub(self.shares.len()))
    }

    pub fn is_ready(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Add one share to the working set.
    pub fn add_share(&mut self, share: Share) -> SeqretsResult<AddOutcome> {
        let view = share.validate()?;
        let incoming = SetHeader {
            session_id: view.session_id,
            threshold: view.threshold,
            total_shares: view.total_shares,
        };

        if let Some(header) = &self.header {
            if header.session_id != incoming.session_id {
                return Err(ShareError::IncompatibleShare(format!(
                    "share #{} belongs to a different sharing session",
                    view.index
                ))
                .into());
            }
            if (header.threshold, header.total_shares) != (incoming.threshold, incoming.total_shares)
            {
                return Err(ShareError::IncompatibleShare(format!(
                    "share #{} is {}-of-{}, collected shares are {}-of-{}",
                    view.index,
                    incoming.threshold,
                    incoming.total_shares,
                    header.threshold,
                    header.total_shares
                ))
                .into());
            }
        }
        if let Some(vault) = &self.vault {
            vault.check_share(&share)?;
        }

        let index = view.index;
        if let Some(existing) = self.shares.get(&index) {
            if existing.payload() == share.payload() {
                debug!(index, "duplicate share ignored");
                return Ok(AddOutcome::Duplicate);
            }
            return Err(ShareError::ConflictingShares { index }.into());
        }

        if self.header.is_none() {
            self.header = Some(incoming);
        }
        self.shares.insert(index, share);
        info!(
            index,
            collected = self.shares.len(),
            threshold = incoming.threshold,
            "share added"
        );
        Ok(AddOutcome::Added)
    }

    /// Attach the vault the collected shares unlock.
    pub fn attach_vault(&mut self, vault: EncryptedVaultFile) -> SeqretsResult<()> {
        vault.session_id()?;
        if let Some(existing) = &self.vault {
            if *existing == vault {
                return Ok(());
            }
            return Err(ShareError::IncompatibleShare(
                "a different vault is already attached".into(),
            )
            .into());
        }
        for share in self.shares.values() {
            vault.check_share(share)?;
        }
        info!(label = %vault.sharing.label, "vault attached");
        self.vault = Some(vault);
        Ok(())
    }

    pub fn ingest(&mut self, item: Ingest) -> SeqretsResult<SubmitReport> {
        let mut report = SubmitReport::default();
        match item {
            Ingest::Share(share) => match self.add_share(share)? {
                AddOutcome::Added => report.shares_added += 1,
                AddOutcome::Duplicate => report.duplicates += 1,
            },
            Ingest::Vault(vault) => {
                self.attach_vault(*vault)?;
                report.vault_attached = true;
            }
        }
        Ok(report)
    }

    /// Decode `input` with `source` and add whatever it yields. Items before
    /// a failing one stay in the set.
    pub fn submit<S: ShareSource + ?Sized>(
        &mut self,
        source: &mut S,
        input: &[u8],
    ) -> SeqretsResult<SubmitReport> {
        let items = source.submit(input)?;
        let mut total = SubmitReport::default();
        for item in items {
            let r = self.ingest(item)?;
            total.shares_added += r.shares_added;
            total.duplicates += r.duplicates;
            total.vault_attached |= r.vault_attached;
        }
        debug!(source = source.name(), ?total, "input submitted");
        Ok(total)
    }

    /// Reconstruct, and decrypt the attached vault if there is one.
    pub fn restore(
        &self,
        password: Option<&SecretString>,
        keyfile: Option<&[u8]>,
    ) -> RestoreSecretResult {
        let needed = self.header.map_or(1, |h| h.threshold as usize);
        if !self.is_ready() {
            return RestoreSecretResult::collecting(
                ShareError::InsufficientShares {
                    needed,
                    got: self.shares.len(),
                }
                .into(),
            );
        }

        let shares: Vec<Share> = self.shares.values().cloned().collect();
        let secret = match reconstruct(&shares) {
            Ok(secret) => secret,
            Err(e) => return RestoreSecretResult::failed(e, None),
        };

        let Some(vault) = &self.vault else {
            info!(len = secret.len(), "secret reconstructed");
            return RestoreSecretResult {
                status: RestoreStatus::SecretRecovered,
                instruction: None,
                label: shares.first().map(|s| s.label().to_string()),
                secret: Some(secret),
                error: None,
            };
        };

        let label = Some(vault.sharing.label.clone());
        let Some(password) = password else {
            return RestoreSecretResult::failed(ParameterError::MissingPassword.into(), label);
        };

        match decrypt_bound(&vault.instruction, password, keyfile, &secret) {
            Ok(instruction) => {
                info!(file = %instruction.file_name, "vault decrypted");
                RestoreSecretResult {
                    status: RestoreStatus::InstructionDecrypted,
                    instruction: Some(instruction),
                    secret: None,
                    label,
                    error: None,
                }
            }
            Err(e) => RestoreSecretResult::failed(e, label),
        }
    }

    /// Forget every share and the attached vault.
    pub fn reset(&mut self) {
        self.header = None;
        self.shares.clear();
        self.vault = None;
        info!("recovery session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqrets_crypto::{seal, split, KdfParams};

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn collects_until_threshold() {
        let shares = split(b"thirty-two bytes of key material", 3, 5, "t").unwrap();
        let mut session = RecoverySession::new();
        assert_eq!(session.remaining(), None);

        session.add_share(shares[4].clone()).unwrap();
        session.add_share(shares[0].clone()).unwrap();
        assert_eq!(session.remaining(), Some(1));

        let early = session.restore(None, None);
        assert_eq!(early.status, RestoreStatus::Collecting);
        assert!(early.error.unwrap().contains("need 3, have 2"));

        session.add_share(shares[2].clone()).unwrap();
        assert!(session.is_ready());
        assert_eq!(session.indices(), vec![1, 3, 5]);

        let result = session.restore(None, None);
        assert_eq!(result.status, RestoreStatus::SecretRecovered);
        assert_eq!(
            result.secret.unwrap().as_bytes(),
            b"thirty-two bytes of key material"
        );
        assert_eq!(result.label.as_deref(), Some("t"));
    }

    #[test]
    fn duplicates_are_idempotent() {
        let shares = split(b"abc", 2, 3, "t").unwrap();
        let mut session = RecoverySession::new();
        assert_eq!(session.add_share(shares[0].clone()).unwrap(), AddOutcome::Added);
        assert_eq!(
            session.add_share(shares[0].clone()).unwrap(),
            AddOutcome::Duplicate
        );
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn foreign_session_rejected() {
        let a = split(b"abc", 2, 3, "a").unwrap();
        let b = split(b"abc", 2, 3, "b").unwrap();
        let mut session = RecoverySession::new();
        session.add_share(a[0].clone()).unwrap();
        let err = session.add_share(b[1].clone()).unwrap_err();
        assert!(matches!(
            err,
            SeqretsError::Share(ShareError::IncompatibleShare(_))
        ));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn conflicting_share_for_same_index_rejected() {
        let a = split(b"abc", 2, 3, "a").unwrap();
        let session_id = a[0].session_id().unwrap();
        let forged = Share::from_parts(session_id, 2, 3, 1, &[0, 0, 0], "a");

        let mut session = RecoverySession::new();
        session.add_share(a[0].clone()).unwrap();
        assert!(matches!(
            session.add_share(forged).unwrap_err(),
            SeqretsError::Share(ShareError::ConflictingShares { index: 1 })
        ));
    }

    #[test]
    fn vault_restore_requires_password() {
        let inst = RawInstruction::from_bytes("will.txt", b"everything to the cat", "text/plain");
        let exported = seal(
            &inst,
            &pw("estate"),
            None,
            2,
            3,
            "estate",
            &KdfParams::insecure_fast(),
        )
        .unwrap();

        let mut session = RecoverySession::new();
        session.attach_vault(exported.vault.clone()).unwrap();
        session.add_share(exported.shares[2].clone()).unwrap();
        session.add_share(exported.shares[0].clone()).unwrap();

        let missing = session.restore(None, None);
        assert_eq!(missing.status, RestoreStatus::Failed);
        assert_eq!(missing.label.as_deref(), Some("estate"));

        let wrong = session.restore(Some(&pw("nope")), None);
        assert_eq!(wrong.status, RestoreStatus::Failed);
        assert!(wrong.error.unwrap().contains("authentication failed"));

        let ok = session.restore(Some(&pw("estate")), None);
        assert_eq!(ok.status, RestoreStatus::InstructionDecrypted);
        assert!(ok.secret.is_none());
        assert_eq!(ok.instruction.unwrap(), inst);
    }

    #[test]
    fn vault_rejects_shares_of_other_sessions() {
        let inst = RawInstruction::from_bytes("a", b"b", "text/plain");
        let exported = seal(&inst, &pw("pw"), None, 2, 3, "v", &KdfParams::insecure_fast()).unwrap();
        let stray = split(b"0123456789abcdef0123456789abcdef", 2, 3, "v").unwrap();

        let mut session = RecoverySession::new();
        session.add_share(stray[0].clone()).unwrap();
        assert!(session.attach_vault(exported.vault.clone()).is_err());

        session.reset();
        session.attach_vault(exported.vault).unwrap();
        assert!(session.add_share(stray[0].clone()).is_err());
        assert!(session.is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let shares = split(b"abc", 2, 3, "t").unwrap();
        let mut session = RecoverySession::new();
        session.add_share(shares[0].clone()).unwrap();
        session.reset();
        assert!(session.is_empty());
        assert!(session.header().is_none());

        let other = split(b"xyz", 3, 4, "u").unwrap();
        session.add_share(other[0].clone()).unwrap();
        assert_eq!(session.header().unwrap().threshold, 3);
    }
}
