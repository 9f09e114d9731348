//! Reader transports: the raw byte channel to a token's storage area
//!
//! A transport knows nothing about PINs or data types. It moves one opaque
//! image per token and reports presence; `CardProtocol` does the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, trace};

use seqrets_core::CardError;

/// Sequential command/response channel to one or more readers.
pub trait CardTransport: Send {
    /// Names of the readers this transport can address.
    fn list_readers(&self) -> Result<Vec<String>, CardError>;
    /// Whether a token is currently inserted in `reader`.
    fn is_present(&self, reader: &str) -> Result<bool, CardError>;
    /// Storage capacity of the inserted token in bytes.
    fn capacity(&self, reader: &str) -> Result<usize, CardError>;
    /// Read the stored image. `None` for a token that was never written.
    fn read_image(&mut self, reader: &str) -> Result<Option<Vec<u8>>, CardError>;
    /// Replace the stored image.
    fn write_image(&mut self, reader: &str, image: &[u8]) -> Result<(), CardError>;
}

// ── In-memory transport ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MemoryToken {
    image: Option<Vec<u8>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct MemorySlot {
    token: Option<MemoryToken>,
    /// Pull the token out during the next read or write
    remove_on_next_io: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    readers: BTreeMap<String, MemorySlot>,
    latency: Option<Duration>,
}

/// Shared in-memory readers.
///
/// Clones share state, so a test can keep a handle to insert, pull and
/// inspect tokens while a `CardProtocol` owns another clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, CardError> {
        self.state
            .lock()
            .map_err(|_| CardError::Transport("memory transport lock poisoned".into()))
    }

    /// Register an empty reader.
    pub fn add_reader(&self, reader: &str) -> Result<(), CardError> {
        self.lock()?.readers.entry(reader.to_string()).or_default();
        Ok(())
    }

    /// Insert a blank token with `capacity` bytes of storage, adding the
    /// reader if needed.
    pub fn insert_card(&self, reader: &str, capacity: usize) -> Result<(), CardError> {
        self.insert_image(reader, None, capacity)
    }

    /// Insert a token holding `image`, e.g. one previously pulled out.
    pub fn insert_image(
        &self,
        reader: &str,
        image: Option<Vec<u8>>,
        capacity: usize,
    ) -> Result<(), CardError> {
        let mut state = self.lock()?;
        let slot = state.readers.entry(reader.to_string()).or_default();
        slot.token = Some(MemoryToken { image, capacity });
        slot.remove_on_next_io = false;
        Ok(())
    }

    /// Pull the token out of `reader`, returning its image.
    pub fn remove_card(&self, reader: &str) -> Result<Option<Vec<u8>>, CardError> {
        let mut state = self.lock()?;
        let slot = state
            .readers
            .get_mut(reader)
            .ok_or_else(|| CardError::UnknownReader(reader.to_string()))?;
        Ok(slot.token.take().and_then(|t| t.image))
    }

    /// Simulate the user yanking the token while the next command runs.
    pub fn remove_during_next_command(&self, reader: &str) -> Result<(), CardError> {
        let mut state = self.lock()?;
        let slot = state
            .readers
            .get_mut(reader)
            .ok_or_else(|| CardError::UnknownReader(reader.to_string()))?;
        slot.remove_on_next_io = true;
        Ok(())
    }

    /// Make every read and write take at least `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) -> Result<(), CardError> {
        self.lock()?.latency = latency;
        Ok(())
    }

    /// Raw stored image, for inspection.
    pub fn image(&self, reader: &str) -> Result<Option<Vec<u8>>, CardError> {
        let state = self.lock()?;
        Ok(state
            .readers
            .get(reader)
            .and_then(|s| s.token.as_ref())
            .and_then(|t| t.image.clone()))
    }

    fn with_token<R>(
        &self,
        reader: &str,
        f: impl FnOnce(&mut MemoryToken) -> Result<R, CardError>,
    ) -> Result<R, CardError> {
        let latency = self.lock()?.latency;
        if let Some(d) = latency {
            std::thread::sleep(d);
        }

        let mut state = self.lock()?;
        let slot = state
            .readers
            .get_mut(reader)
            .ok_or_else(|| CardError::UnknownReader(reader.to_string()))?;
        if slot.remove_on_next_io {
            slot.remove_on_next_io = false;
            slot.token = None;
            debug!(reader, "token pulled mid-command");
            return Err(CardError::CardRemoved);
        }
        let token = slot.token.as_mut().ok_or(CardError::CardRemoved)?;
        f(token)
    }
}

impl CardTransport for MemoryTransport {
    fn list_readers(&self) -> Result<Vec<String>, CardError> {
        Ok(self.lock()?.readers.keys().cloned().collect())
    }

    fn is_present(&self, reader: &str) -> Result<bool, CardError> {
        let state = self.lock()?;
        let slot = state
            .readers
            .get(reader)
            .ok_or_else(|| CardError::UnknownReader(reader.to_string()))?;
        Ok(slot.token.is_some())
    }

    fn capacity(&self, reader: &str) -> Result<usize, CardError> {
        let state = self.lock()?;
        state
            .readers
            .get(reader)
            .ok_or_else(|| CardError::UnknownReader(reader.to_string()))?
            .token
            .as_ref()
            .map(|t| t.capacity)
            .ok_or_else(|| CardError::NoCard(reader.to_string()))
    }

    fn read_image(&mut self, reader: &str) -> Result<Option<Vec<u8>>, CardError> {
        self.with_token(reader, |t| Ok(t.image.clone()))
    }

    fn write_image(&mut self, reader: &str, image: &[u8]) -> Result<(), CardError> {
        self.with_token(reader, |t| {
            if image.len() > t.capacity {
                return Err(CardError::CardFull {
                    needed: image.len(),
                    capacity: t.capacity,
                });
            }
            t.image = Some(image.to_vec());
            Ok(())
        })
    }
}

// ── File-backed emulator ──────────────────────────────────────────────────────

/// Card emulator backed by a directory: each `<reader>.card` file is an
/// inserted token, an empty file a blank one. Deleting the file pulls the
/// token.
#[derive(Debug, Clone)]
pub struct FileTransport {
    dir: PathBuf,
    capacity: usize,
}

const CARD_EXTENSION: &str = "card";

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, reader: &str) -> Result<PathBuf, CardError> {
        let valid = !reader.is_empty()
            && reader
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !reader.starts_with('.');
        if !valid {
            return Err(CardError::UnknownReader(reader.to_string()));
        }
        Ok(self.dir.join(format!("{reader}.{CARD_EXTENSION}")))
    }

    /// Insert a blank token into `reader`, creating the emulator directory
    /// if needed. Existing tokens are left untouched.
    pub fn insert_blank(&self, reader: &str) -> Result<(), CardError> {
        let path = self.path_for(reader)?;
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        if !path.exists() {
            std::fs::write(&path, b"").map_err(io_err)?;
            debug!(reader, path = %path.display(), "blank card inserted");
        }
        Ok(())
    }
}

fn io_err(e: std::io::Error) -> CardError {
    CardError::Transport(e.to_string())
}

impl CardTransport for FileTransport {
    fn list_readers(&self) -> Result<Vec<String>, CardError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut readers: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(CARD_EXTENSION))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        readers.sort();
        Ok(readers)
    }

    fn is_present(&self, reader: &str) -> Result<bool, CardError> {
        Ok(self.path_for(reader)?.is_file())
    }

    fn capacity(&self, reader: &str) -> Result<usize, CardError> {
        if !self.is_present(reader)? {
            return Err(CardError::NoCard(reader.to_string()));
        }
        Ok(self.capacity)
    }

    fn read_image(&mut self, reader: &str) -> Result<Option<Vec<u8>>, CardError> {
        let path = self.path_for(reader)?;
        match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => {
                trace!(reader, len = bytes.len(), "card image read");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CardError::CardRemoved),
            Err(e) => Err(io_err(e)),
        }
    }

    fn write_image(&mut self, reader: &str, image: &[u8]) -> Result<(), CardError> {
        let path = self.path_for(reader)?;
        if !path.is_file() {
            return Err(CardError::CardRemoved);
        }
        if image.len() > self.capacity {
            return Err(CardError::CardFull {
                needed: image.len(),
                capacity: self.capacity,
            });
        }

        // Write-then-rename so a crash never leaves a half-written token.
        let tmp = path.with_extension(format!("{CARD_EXTENSION}.tmp"));
        std::fs::write(&tmp, image).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;
        trace!(reader, len = image.len(), "card image written");
        Ok(())
    }
}
