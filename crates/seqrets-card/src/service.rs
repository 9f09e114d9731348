//! Async front end for the card protocol
//!
//! Reader I/O is blocking, so every command runs on the blocking pool. Each
//! reader gets its own protocol instance behind an async lock: commands for
//! one token run one at a time in submission order, while other readers
//! carry on in parallel.
//!
//! The timeout is applied twice. A command still queued when it expires is
//! dropped without touching the token. A command that started and then
//! exceeds it is reported as `CardError::Timeout` but still runs to
//! completion on its worker, keeping the reader busy until it does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use seqrets_core::config::CardConfig;
use seqrets_core::{CardData, CardError, CardStatus, SeqretsError, SeqretsResult, Share};

use crate::protocol::{CardPolicy, CardProtocol};
use crate::transport::CardTransport;

type ReaderSlot<T> = Arc<tokio::sync::Mutex<CardProtocol<T>>>;

pub struct CardService<T: CardTransport + 'static> {
    transport: T,
    policy: CardPolicy,
    readers: Arc<Mutex<HashMap<String, ReaderSlot<T>>>>,
    timeout: Duration,
}

impl<T: CardTransport + Clone + 'static> Clone for CardService<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            policy: self.policy,
            readers: Arc::clone(&self.readers),
            timeout: self.timeout,
        }
    }
}

impl<T: CardTransport + Clone + Sync + 'static> CardService<T> {
    /// Clones of `transport` must address the same readers.
    pub fn new(transport: T, policy: CardPolicy, timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            readers: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn from_config(transport: T, config: &CardConfig) -> Self {
        Self::new(
            transport,
            CardPolicy::from(config),
            Duration::from_secs(config.command_timeout_secs.max(1)),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn slot(&self, reader: &str) -> SeqretsResult<ReaderSlot<T>> {
        let mut readers = self
            .readers
            .lock()
            .map_err(|_| CardError::Transport("card reader table lock poisoned".into()))?;
        let slot = readers.entry(reader.to_string()).or_insert_with(|| {
            debug!(reader, "opening reader");
            Arc::new(tokio::sync::Mutex::new(CardProtocol::new(
                self.transport.clone(),
                self.policy,
            )))
        });
        Ok(Arc::clone(slot))
    }

    async fn run<R, F>(&self, reader: &str, command: &'static str, f: F) -> SeqretsResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut CardProtocol<T>) -> SeqretsResult<R> + Send + 'static,
    {
        let slot = self.slot(reader)?;
        let mut guard = match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    reader,
                    command,
                    timeout = ?self.timeout,
                    "card command timed out before it started"
                );
                return Err(CardError::Timeout.into());
            }
        };

        // The guard moves onto the worker so the reader stays held until the
        // command really finishes, even after a timeout.
        let task = tokio::task::spawn_blocking(move || f(&mut *guard));
        self.wait(command, task).await
    }

    async fn wait<R>(
        &self,
        command: &'static str,
        task: JoinHandle<SeqretsResult<R>>,
    ) -> SeqretsResult<R> {
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(SeqretsError::Other(anyhow::anyhow!(
                "card command '{command}' panicked: {join}"
            ))),
            Err(_) => {
                warn!(command, timeout = ?self.timeout, "card command timed out");
                Err(CardError::Timeout.into())
            }
        }
    }

    pub async fn list_readers(&self) -> SeqretsResult<Vec<String>> {
        let transport = self.transport.clone();
        let task = tokio::task::spawn_blocking(move || -> SeqretsResult<Vec<String>> {
            Ok(transport.list_readers()?)
        });
        self.wait("list_readers", task).await
    }

    pub async fn get_status(&self, reader: &str) -> SeqretsResult<CardStatus> {
        let target = reader.to_string();
        self.run(reader, "get_status", move |p| p.get_status(&target))
            .await
    }

    pub async fn set_pin(&self, reader: &str, pin: SecretString) -> SeqretsResult<()> {
        let target = reader.to_string();
        self.run(reader, "set_pin", move |p| {
            p.set_pin(&target, pin.expose_secret())
        })
        .await
    }

    pub async fn verify_pin(&self, reader: &str, pin: SecretString) -> SeqretsResult<()> {
        let target = reader.to_string();
        self.run(reader, "verify_pin", move |p| {
            p.verify_pin(&target, pin.expose_secret())
        })
        .await
    }

    pub async fn change_pin(
        &self,
        reader: &str,
        old_pin: SecretString,
        new_pin: SecretString,
    ) -> SeqretsResult<()> {
        let target = reader.to_string();
        self.run(reader, "change_pin", move |p| {
            p.change_pin(&target, old_pin.expose_secret(), new_pin.expose_secret())
        })
        .await
    }

    pub async fn write_share_to_card(
        &self,
        reader: &str,
        share: Share,
        label: &str,
    ) -> SeqretsResult<()> {
        let target = reader.to_string();
        let label = label.to_string();
        self.run(reader, "write_share", move |p| {
            p.write_share_to_card(&target, &share, &label)
        })
        .await
    }

    pub async fn write_vault_to_card(
        &self,
        reader: &str,
        vault_json: String,
        label: &str,
    ) -> SeqretsResult<()> {
        let target = reader.to_string();
        let label = label.to_string();
        self.run(reader, "write_vault", move |p| {
            p.write_vault_to_card(&target, &vault_json, &label)
        })
        .await
    }

    pub async fn read_card(&self, reader: &str) -> SeqretsResult<CardData> {
        let target = reader.to_string();
        self.run(reader, "read_card", move |p| p.read_card(&target))
            .await
    }

    pub async fn erase_card(&self, reader: &str) -> SeqretsResult<()> {
        let target = reader.to_string();
        self.run(reader, "erase_card", move |p| p.erase_card(&target))
            .await
    }

    pub async fn factory_reset(&self, reader: &str) -> SeqretsResult<()> {
        let target = reader.to_string();
        self.run(reader, "factory_reset", move |p| p.factory_reset(&target))
            .await
    }

    /// Run an arbitrary closure against `reader`'s protocol on the worker.
    pub async fn with_protocol<R, F>(&self, reader: &str, f: F) -> SeqretsResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut CardProtocol<T>) -> SeqretsResult<R> + Send + 'static,
    {
        self.run(reader, "custom", f).await
    }
}
