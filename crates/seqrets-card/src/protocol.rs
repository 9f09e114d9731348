//! PIN state machine and storage commands against one token per reader
//!
//! ```text
//! Disconnected ──insert──→ Connected(pin_set, pin_verified) ──max wrong PINs──→ Blocked
//!       ↑                        │                                                │
//!       └────────remove──────────┘                           factory_reset ───────┘
//! ```
//! The attempt counter lives on the token; whether a PIN was verified lives
//! in `CardSessions` and is forgotten on removal or when a different card
//! shows up in the same reader.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use seqrets_core::config::CardConfig;
use seqrets_core::{
    CardData, CardError, CardStatus, DataType, ReaderState, SeqretsError, SeqretsResult, Share,
};

use crate::image::{CardImage, PinRecord, StoredData};
use crate::transport::CardTransport;

pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardPolicy {
    /// Consecutive wrong PINs before the card blocks
    pub max_pin_attempts: u8,
    /// Whether `erase_card` also clears the PIN
    pub erase_resets_pin: bool,
}

impl Default for CardPolicy {
    fn default() -> Self {
        Self {
            max_pin_attempts: 3,
            erase_resets_pin: false,
        }
    }
}

impl From<&CardConfig> for CardPolicy {
    fn from(config: &CardConfig) -> Self {
        Self {
            max_pin_attempts: config.max_pin_attempts.max(1),
            erase_resets_pin: config.erase_resets_pin,
        }
    }
}

#[derive(Debug, Clone)]
struct ReaderSession {
    card_id: String,
    pin_verified: bool,
}

/// Per-reader session state, keyed by reader name.
#[derive(Debug, Default)]
pub struct CardSessions {
    readers: HashMap<String, ReaderSession>,
}

impl CardSessions {
    pub fn is_verified(&self, reader: &str, card_id: &str) -> bool {
        self.readers
            .get(reader)
            .is_some_and(|s| s.pin_verified && s.card_id == card_id)
    }

    fn bind(&mut self, reader: &str, card_id: &str) {
        match self.readers.get(reader) {
            Some(s) if s.card_id == card_id => {}
            Some(_) => {
                debug!(reader, "different card in reader, session reset");
                self.readers.insert(reader.to_string(), Self::fresh(card_id));
            }
            None => {
                self.readers.insert(reader.to_string(), Self::fresh(card_id));
            }
        }
    }

    fn fresh(card_id: &str) -> ReaderSession {
        ReaderSession {
            card_id: card_id.to_string(),
            pin_verified: false,
        }
    }

    fn mark_verified(&mut self, reader: &str, card_id: &str) {
        self.readers.insert(
            reader.to_string(),
            ReaderSession {
                card_id: card_id.to_string(),
                pin_verified: true,
            },
        );
    }

    fn clear_verified(&mut self, reader: &str) {
        if let Some(s) = self.readers.get_mut(reader) {
            s.pin_verified = false;
        }
    }

    /// Forget everything about `reader`.
    pub fn drop_reader(&mut self, reader: &str) {
        if self.readers.remove(reader).is_some() {
            debug!(reader, "card session dropped");
        }
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

fn validate_pin(pin: &str) -> Result<(), CardError> {
    let len = pin.chars().count();
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&len) {
        return Err(CardError::InvalidPin(format!(
            "PIN must be {MIN_PIN_LEN}-{MAX_PIN_LEN} characters, got {len}"
        )));
    }
    Ok(())
}

/// Card storage protocol over a transport. Not thread-safe on its own;
/// `CardService` keeps one per reader and serialises access to it.
pub struct CardProtocol<T: CardTransport> {
    transport: T,
    policy: CardPolicy,
    sessions: CardSessions,
}

impl<T: CardTransport> CardProtocol<T> {
    pub fn new(transport: T, policy: CardPolicy) -> Self {
        Self {
            transport,
            policy,
            sessions: CardSessions::default(),
        }
    }

    pub fn policy(&self) -> &CardPolicy {
        &self.policy
    }

    pub fn sessions(&self) -> &CardSessions {
        &self.sessions
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn list_readers(&self) -> SeqretsResult<Vec<String>> {
        Ok(self.transport.list_readers()?)
    }

    // ── Token I/O ─────────────────────────────────────────────────────────────

    /// Transport failures after the presence check mean the token left.
    fn mid_command(&mut self, reader: &str, err: CardError) -> CardError {
        match err {
            CardError::CardRemoved | CardError::NoCard(_) => {
                warn!(reader, "card removed during command");
                self.sessions.drop_reader(reader);
                CardError::CardRemoved
            }
            other => other,
        }
    }

    fn ensure_present(&mut self, reader: &str) -> Result<(), CardError> {
        if !self.transport.is_present(reader)? {
            self.sessions.drop_reader(reader);
            return Err(CardError::NoCard(reader.to_string()));
        }
        Ok(())
    }

    fn load(&mut self, reader: &str) -> Result<CardImage, CardError> {
        self.ensure_present(reader)?;
        let raw = self
            .transport
            .read_image(reader)
            .map_err(|e| self.mid_command(reader, e))?;

        match raw {
            Some(bytes) => {
                let image = CardImage::from_bytes(&bytes)?;
                self.sessions.bind(reader, &image.card_id);
                Ok(image)
            }
            None => {
                self.sessions.drop_reader(reader);
                Ok(CardImage::blank())
            }
        }
    }

    fn store(&mut self, reader: &str, image: &CardImage) -> Result<(), CardError> {
        let bytes = image.to_bytes()?;
        let capacity = self
            .transport
            .capacity(reader)
            .map_err(|e| self.mid_command(reader, e))?;
        if bytes.len() > capacity {
            return Err(CardError::CardFull {
                needed: bytes.len(),
                capacity,
            });
        }
        self.transport
            .write_image(reader, &bytes)
            .map_err(|e| self.mid_command(reader, e))
    }

    fn is_blocked(&self, image: &CardImage) -> bool {
        image
            .pin
            .as_ref()
            .is_some_and(|p| p.failed_attempts >= self.policy.max_pin_attempts)
    }

    /// Data commands need a verified PIN whenever one is set.
    fn require_access(&self, reader: &str, image: &CardImage) -> Result<(), CardError> {
        if image.pin.is_none() {
            return Ok(());
        }
        if self.is_blocked(image) {
            return Err(CardError::CardBlocked);
        }
        if !self.sessions.is_verified(reader, &image.card_id) {
            return Err(CardError::NotVerified);
        }
        Ok(())
    }

    /// Compare `pin` against the stored record, persisting the attempt
    /// counter before reporting the outcome.
    fn check_pin(&mut self, reader: &str, image: &mut CardImage, pin: &str) -> Result<(), CardError> {
        let max = self.policy.max_pin_attempts;
        let Some(record) = image.pin.as_mut() else {
            return Err(CardError::PinNotSet);
        };
        if record.failed_attempts >= max {
            return Err(CardError::CardBlocked);
        }

        if record.matches(pin)? {
            if record.failed_attempts != 0 {
                record.failed_attempts = 0;
                self.store(reader, image)?;
            }
            return Ok(());
        }

        record.failed_attempts = record.failed_attempts.saturating_add(1);
        let remaining = max.saturating_sub(record.failed_attempts);
        self.sessions.clear_verified(reader);
        self.store(reader, image)?;

        if remaining == 0 {
            warn!(reader, "PIN attempts exhausted, card blocked");
        } else {
            warn!(reader, remaining, "wrong PIN");
        }
        Err(CardError::WrongPin { remaining })
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Fresh snapshot of the token. Never fails for an empty reader.
    pub fn get_status(&mut self, reader: &str) -> SeqretsResult<CardStatus> {
        if !self.transport.is_present(reader)? {
            self.sessions.drop_reader(reader);
            return Ok(CardStatus::disconnected());
        }
        let image = self.load(reader)?;
        let max = self.policy.max_pin_attempts;
        let blocked = self.is_blocked(&image);
        let failed = image.pin.as_ref().map_or(0, |p| p.failed_attempts);

        Ok(CardStatus {
            state: if blocked {
                ReaderState::Blocked
            } else {
                ReaderState::Connected
            },
            has_data: image.data.is_some(),
            data_length: image.data.as_ref().map_or(0, |d| d.data.len()),
            data_type: image.data.as_ref().map_or(DataType::Empty, |d| d.data_type),
            label: image
                .data
                .as_ref()
                .map(|d| d.label.clone())
                .unwrap_or_default(),
            pin_set: image.pin.is_some(),
            pin_verified: image.pin.is_some()
                && !blocked
                && self.sessions.is_verified(reader, &image.card_id),
            attempts_remaining: max.saturating_sub(failed),
        })
    }

    /// Set the first PIN. The current session counts as verified afterwards.
    pub fn set_pin(&mut self, reader: &str, pin: &str) -> SeqretsResult<()> {
        validate_pin(pin)?;
        let mut image = self.load(reader)?;
        if image.pin.is_some() {
            if self.is_blocked(&image) {
                return Err(CardError::CardBlocked.into());
            }
            return Err(CardError::PinAlreadySet.into());
        }

        image.pin = Some(PinRecord::new(pin));
        self.store(reader, &image)?;
        self.sessions.mark_verified(reader, &image.card_id);
        info!(reader, "PIN set");
        Ok(())
    }

    pub fn verify_pin(&mut self, reader: &str, pin: &str) -> SeqretsResult<()> {
        let mut image = self.load(reader)?;
        if image.pin.is_some() && !self.is_blocked(&image) {
            validate_pin(pin)?;
        }
        self.check_pin(reader, &mut image, pin)?;
        self.sessions.mark_verified(reader, &image.card_id);
        debug!(reader, "PIN verified");
        Ok(())
    }

    /// Replace the PIN. Needs a verified session and the current PIN, which
    /// is counted against the attempt limit like `verify_pin`.
    pub fn change_pin(&mut self, reader: &str, old_pin: &str, new_pin: &str) -> SeqretsResult<()> {
        validate_pin(new_pin)?;
        let mut image = self.load(reader)?;
        if image.pin.is_none() {
            return Err(CardError::PinNotSet.into());
        }
        self.require_access(reader, &image)?;
        self.check_pin(reader, &mut image, old_pin)?;

        image.pin = Some(PinRecord::new(new_pin));
        self.store(reader, &image)?;
        self.sessions.mark_verified(reader, &image.card_id);
        info!(reader, "PIN changed");
        Ok(())
    }

    fn write_data(
        &mut self,
        reader: &str,
        data_type: DataType,
        data: String,
        label: &str,
    ) -> SeqretsResult<()> {
        let mut image = self.load(reader)?;
        self.require_access(reader, &image)?;

        let len = data.len();
        image.data = Some(StoredData {
            data_type,
            label: label.to_string(),
            data,
        });
        self.store(reader, &image)?;
        info!(reader, %data_type, len, label, "card written");
        Ok(())
    }

    /// Store one share, replacing whatever the card held.
    pub fn write_share_to_card(&mut self, reader: &str, share: &Share, label: &str) -> SeqretsResult<()> {
        share.validate()?;
        let json = share.to_json()?;
        self.write_data(reader, DataType::Share, json, label)
    }

    /// Store a vault file, replacing whatever the card held.
    pub fn write_vault_to_card(&mut self, reader: &str, vault_json: &str, label: &str) -> SeqretsResult<()> {
        serde_json::from_str::<serde_json::Value>(vault_json)
            .map_err(|e| SeqretsError::Format(format!("vault is not JSON: {e}")))?;
        self.write_data(reader, DataType::Vault, vault_json.to_string(), label)
    }

    pub fn read_card(&mut self, reader: &str) -> SeqretsResult<CardData> {
        let image = self.load(reader)?;
        self.require_access(reader, &image)?;

        Ok(match image.data {
            Some(stored) => CardData {
                data: stored.data,
                data_type: stored.data_type,
                label: stored.label,
            },
            None => CardData {
                data: String::new(),
                data_type: DataType::Empty,
                label: String::new(),
            },
        })
    }

    /// Clear the stored data, and the PIN too when the policy says so.
    pub fn erase_card(&mut self, reader: &str) -> SeqretsResult<()> {
        let mut image = self.load(reader)?;
        self.require_access(reader, &image)?;

        image.data = None;
        if self.policy.erase_resets_pin {
            image.pin = None;
        }
        self.store(reader, &image)?;
        if self.policy.erase_resets_pin {
            self.sessions.drop_reader(reader);
        }
        info!(reader, pin_reset = self.policy.erase_resets_pin, "card erased");
        Ok(())
    }

    /// Out-of-band wipe of PIN and data under a new card id. The only way
    /// out of `Blocked`; works on unreadable images too.
    pub fn factory_reset(&mut self, reader: &str) -> SeqretsResult<()> {
        self.ensure_present(reader)?;
        let image = CardImage::blank();
        self.store(reader, &image)?;
        self.sessions.drop_reader(reader);
        warn!(reader, "card factory reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use seqrets_core::{SessionId, ShareError};

    const READER: &str = "reader-0";

    fn setup() -> (MemoryTransport, CardProtocol<MemoryTransport>) {
        let handle = MemoryTransport::new();
        handle.insert_card(READER, 4096).unwrap();
        let protocol = CardProtocol::new(handle.clone(), CardPolicy::default());
        (handle, protocol)
    }

    fn card_err(result: SeqretsResult<impl std::fmt::Debug>) -> CardError {
        match result {
            Err(SeqretsError::Card(e)) => e,
            other => panic!("expected card error, got {other:?}"),
        }
    }

    fn share() -> Share {
        Share::from_parts(SessionId::from_bytes([1; 16]), 2, 3, 1, &[9, 8, 7], "qard")
    }

    #[test]
    fn blank_card_status() {
        let (_, mut p) = setup();
        let status = p.get_status(READER).unwrap();
        assert_eq!(status.state, ReaderState::Connected);
        assert!(!status.pin_set);
        assert!(!status.has_data);
        assert_eq!(status.data_type, DataType::Empty);
        assert_eq!(status.attempts_remaining, 3);
    }

    #[test]
    fn empty_reader_is_disconnected() {
        let (handle, mut p) = setup();
        handle.remove_card(READER).unwrap();
        assert_eq!(p.get_status(READER).unwrap(), CardStatus::disconnected());
        assert_eq!(
            card_err(p.read_card(READER)),
            CardError::NoCard(READER.into())
        );
    }

    #[test]
    fn set_and_verify_pin() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();
        assert!(p.get_status(READER).unwrap().pin_verified);
        assert_eq!(card_err(p.set_pin(READER, "5678")), CardError::PinAlreadySet);

        let mut fresh = CardProtocol::new(handle, CardPolicy::default());
        let status = fresh.get_status(READER).unwrap();
        assert!(status.pin_set);
        assert!(!status.pin_verified);
        fresh.verify_pin(READER, "1234").unwrap();
        assert!(fresh.get_status(READER).unwrap().pin_verified);
    }

    #[test]
    fn verify_without_pin() {
        let (_, mut p) = setup();
        assert_eq!(card_err(p.verify_pin(READER, "1234")), CardError::PinNotSet);
    }

    #[test]
    fn three_wrong_pins_block_the_card() {
        let (_, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();

        assert_eq!(
            card_err(p.verify_pin(READER, "0000")),
            CardError::WrongPin { remaining: 2 }
        );
        assert_eq!(
            card_err(p.verify_pin(READER, "0000")),
            CardError::WrongPin { remaining: 1 }
        );
        assert_eq!(
            card_err(p.verify_pin(READER, "0000")),
            CardError::WrongPin { remaining: 0 }
        );

        let status = p.get_status(READER).unwrap();
        assert_eq!(status.state, ReaderState::Blocked);
        assert_eq!(status.attempts_remaining, 0);
        assert!(!status.pin_verified);

        assert_eq!(card_err(p.verify_pin(READER, "1234")), CardError::CardBlocked);
        assert_eq!(card_err(p.read_card(READER)), CardError::CardBlocked);

        p.factory_reset(READER).unwrap();
        let status = p.get_status(READER).unwrap();
        assert_eq!(status.state, ReaderState::Connected);
        assert!(!status.pin_set);
    }

    #[test]
    fn correct_pin_resets_counter() {
        let (_, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();
        p.verify_pin(READER, "9999").unwrap_err();
        assert_eq!(p.get_status(READER).unwrap().attempts_remaining, 2);
        p.verify_pin(READER, "1234").unwrap();
        assert_eq!(p.get_status(READER).unwrap().attempts_remaining, 3);
    }

    #[test]
    fn counter_survives_reconnection() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();
        p.verify_pin(READER, "9999").unwrap_err();

        let image = handle.remove_card(READER).unwrap();
        handle.insert_image(READER, image, 4096).unwrap();

        let mut other = CardProtocol::new(handle, CardPolicy::default());
        assert_eq!(other.get_status(READER).unwrap().attempts_remaining, 2);
    }

    #[test]
    fn unverified_write_rejected() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();

        let mut other = CardProtocol::new(handle, CardPolicy::default());
        assert_eq!(
            card_err(other.write_share_to_card(READER, &share(), "qard")),
            CardError::NotVerified
        );
        assert_eq!(card_err(other.read_card(READER)), CardError::NotVerified);
        assert_eq!(card_err(other.erase_card(READER)), CardError::NotVerified);
    }

    #[test]
    fn share_write_and_read_back() {
        let (_, mut p) = setup();
        assert_eq!(p.read_card(READER).unwrap().data_type, DataType::Empty);

        p.write_share_to_card(READER, &share(), "qard 1 of 3").unwrap();
        let status = p.get_status(READER).unwrap();
        assert!(status.has_data);
        assert_eq!(status.data_type, DataType::Share);
        assert_eq!(status.label, "qard 1 of 3");

        let data = p.read_card(READER).unwrap();
        assert_eq!(data.data_type, DataType::Share);
        assert_eq!(Share::from_json(&data.data).unwrap(), share());
        assert_eq!(status.data_length, data.data.len());
    }

    #[test]
    fn vault_overwrites_share() {
        let (_, mut p) = setup();
        p.write_share_to_card(READER, &share(), "a").unwrap();
        p.write_vault_to_card(READER, r#"{"ciphertext":"AA=="}"#, "vault").unwrap();
        let data = p.read_card(READER).unwrap();
        assert_eq!(data.data_type, DataType::Vault);
        assert_eq!(data.label, "vault");

        assert!(matches!(
            p.write_vault_to_card(READER, "not json", "vault"),
            Err(SeqretsError::Format(_))
        ));
    }

    #[test]
    fn corrupt_share_never_written() {
        let (_, mut p) = setup();
        let bad: Share = serde_json::from_str(
            r#"{"index":1,"threshold":2,"totalShares":3,"payload":"AAAA","label":"x"}"#,
        )
        .unwrap();
        assert!(matches!(
            p.write_share_to_card(READER, &bad, "x"),
            Err(SeqretsError::Share(ShareError::CorruptShareEncoding(_)))
        ));
    }

    #[test]
    fn oversized_payload_is_card_full() {
        let handle = MemoryTransport::new();
        handle.insert_card(READER, 256).unwrap();
        let mut p = CardProtocol::new(handle, CardPolicy::default());
        let big = format!("{{\"blob\":\"{}\"}}", "x".repeat(400));
        match card_err(p.write_vault_to_card(READER, &big, "big")) {
            CardError::CardFull { needed, capacity } => {
                assert_eq!(capacity, 256);
                assert!(needed > 400);
            }
            other => panic!("expected CardFull, got {other:?}"),
        }
    }

    #[test]
    fn removal_mid_command_drops_session() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();
        assert_eq!(p.sessions().len(), 1);

        handle.remove_during_next_command(READER).unwrap();
        assert_eq!(card_err(p.read_card(READER)), CardError::CardRemoved);
        assert!(p.sessions().is_empty());
        assert_eq!(p.get_status(READER).unwrap(), CardStatus::disconnected());
    }

    #[test]
    fn reinserted_card_needs_pin_again() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();

        let image = handle.remove_card(READER).unwrap();
        assert_eq!(p.get_status(READER).unwrap().state, ReaderState::Disconnected);
        handle.insert_image(READER, image, 4096).unwrap();

        assert!(!p.get_status(READER).unwrap().pin_verified);
        assert_eq!(card_err(p.read_card(READER)), CardError::NotVerified);
    }

    #[test]
    fn swapped_card_needs_its_own_pin() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();

        // Prepare a second PIN-protected card in another reader, then move it.
        handle.insert_card("reader-1", 4096).unwrap();
        p.set_pin("reader-1", "1234").unwrap();
        let other = handle.remove_card("reader-1").unwrap();
        handle.insert_image(READER, other, 4096).unwrap();

        assert_eq!(card_err(p.read_card(READER)), CardError::NotVerified);
    }

    #[test]
    fn erase_keeps_pin_by_default() {
        let (_, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();
        p.write_share_to_card(READER, &share(), "x").unwrap();
        p.erase_card(READER).unwrap();

        let status = p.get_status(READER).unwrap();
        assert!(!status.has_data);
        assert!(status.pin_set);
        assert!(status.pin_verified);
    }

    #[test]
    fn erase_can_reset_pin() {
        let handle = MemoryTransport::new();
        handle.insert_card(READER, 4096).unwrap();
        let policy = CardPolicy {
            erase_resets_pin: true,
            ..CardPolicy::default()
        };
        let mut p = CardProtocol::new(handle, policy);
        p.set_pin(READER, "1234").unwrap();
        p.erase_card(READER).unwrap();
        assert!(!p.get_status(READER).unwrap().pin_set);
    }

    #[test]
    fn change_pin_flow() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();
        assert_eq!(
            card_err(p.change_pin(READER, "0000", "5678")),
            CardError::WrongPin { remaining: 2 }
        );
        // The wrong old PIN also ended verification.
        assert_eq!(
            card_err(p.change_pin(READER, "1234", "5678")),
            CardError::NotVerified
        );

        p.verify_pin(READER, "1234").unwrap();
        p.change_pin(READER, "1234", "5678").unwrap();

        let mut fresh = CardProtocol::new(handle, CardPolicy::default());
        assert!(fresh.verify_pin(READER, "1234").is_err());
        fresh.verify_pin(READER, "5678").unwrap();
    }

    #[test]
    fn change_pin_requires_verification() {
        let (handle, mut p) = setup();
        p.set_pin(READER, "1234").unwrap();
        let mut fresh = CardProtocol::new(handle, CardPolicy::default());
        assert_eq!(
            card_err(fresh.change_pin(READER, "1234", "5678")),
            CardError::NotVerified
        );
    }

    #[test]
    fn pin_length_enforced() {
        let (_, mut p) = setup();
        assert!(matches!(
            card_err(p.set_pin(READER, "123")),
            CardError::InvalidPin(_)
        ));
        assert!(matches!(
            card_err(p.set_pin(READER, &"1".repeat(17))),
            CardError::InvalidPin(_)
        ));
        p.set_pin(READER, "abcd").unwrap();
    }

    #[test]
    fn policy_from_config() {
        let config = CardConfig {
            max_pin_attempts: 5,
            erase_resets_pin: true,
            ..CardConfig::default()
        };
        let policy = CardPolicy::from(&config);
        assert_eq!(policy.max_pin_attempts, 5);
        assert!(policy.erase_resets_pin);
    }
}
