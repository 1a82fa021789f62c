//! Load and save the configuration record over a raw byte store.
//!
//! The byte store is modelled on an emulated EEPROM: reads and writes are
//! addressed by offset and nothing is durable until [`ByteStore::commit`]
//! succeeds.

use super::record::{ConfigRecord, RecordError, RECORD_LEN};
use log::{info, warn};
use std::fmt;

/// Offset of the configuration record inside the byte store.
pub const RECORD_OFFSET: usize = 0;

/// Raw persistent byte storage.
pub trait ByteStore {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Stage `bytes` at `offset`. Not durable until committed.
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError>;

    /// Make all staged writes durable.
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// Configuration record persistence.
pub struct ConfigStore<S: ByteStore> {
    store: S,
}

impl<S: ByteStore> ConfigStore<S> {
    /// Wrap a byte store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the record, falling back to defaults on blank or invalid storage.
    ///
    /// Defaults are returned with `saved == false` and are not written back.
    pub fn load(&mut self) -> ConfigRecord {
        info!("Loading configuration");
        let mut buf = [0u8; RECORD_LEN];
        let record = match self.store.read(RECORD_OFFSET, &mut buf) {
            Ok(()) => match ConfigRecord::from_bytes(&buf) {
                Ok(record) => {
                    info!("Configuration loaded from storage");
                    record
                }
                Err(RecordError::NotSaved) => {
                    info!("No saved configuration, using defaults");
                    ConfigRecord::default()
                }
                Err(e) => {
                    warn!("Stored configuration is corrupted ({}), using defaults", e);
                    ConfigRecord::default()
                }
            },
            Err(e) => {
                warn!("Failed to read configuration ({}), using defaults", e);
                ConfigRecord::default()
            }
        };
        buf.fill(0);

        info!("AP SSID: {}", record.ap_ssid);
        info!("Motor pins: {}", record.motor_pins);
        record
    }

    /// Persist the record with a single write and commit.
    ///
    /// The record is marked as saved on success. On failure the caller's
    /// record is left untouched.
    pub fn save(&mut self, record: &mut ConfigRecord) -> Result<(), StoreError> {
        info!("Saving configuration");
        let mut staged = record.clone();
        staged.saved = true;
        let mut bytes = staged.to_bytes().map_err(StoreError::InvalidRecord)?;
        let result = self
            .store
            .write(RECORD_OFFSET, &bytes)
            .and_then(|()| self.store.commit());
        bytes.fill(0);
        result?;

        record.saved = true;
        info!("Configuration saved");
        Ok(())
    }

    /// Borrow the underlying byte store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Mutably borrow the underlying byte store.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

/// In-memory byte store.
///
/// Starts erased (`0xFF`, like fresh flash). Staged writes only become
/// visible to reads after a commit. Failures can be injected for tests.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    durable: Vec<u8>,
    staged: Vec<u8>,
    commits: usize,
    writes: usize,
    fail_writes: bool,
    fail_commits: bool,
}

impl MemoryStore {
    /// Create an erased store of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            durable: vec![0xFF; size],
            staged: vec![0xFF; size],
            commits: 0,
            writes: 0,
            fail_writes: false,
            fail_commits: false,
        }
    }

    /// Create a store pre-loaded with durable contents.
    pub fn with_contents(contents: &[u8]) -> Self {
        let mut store = Self::new(contents.len());
        store.durable.copy_from_slice(contents);
        store.staged.copy_from_slice(contents);
        store
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make every subsequent commit fail.
    pub fn fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Durable contents.
    pub fn contents(&self) -> &[u8] {
        &self.durable
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Number of accepted writes.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), StoreError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.durable.len() => Ok(()),
            _ => Err(StoreError::OutOfRange {
                offset,
                len,
                size: self.durable.len(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(RECORD_LEN)
    }
}

impl ByteStore for MemoryStore {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        self.check_range(offset, buf.len())?;
        buf.copy_from_slice(&self.durable[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        self.check_range(offset, bytes.len())?;
        if self.fail_writes {
            return Err(StoreError::WriteFailed("injected write failure".into()));
        }
        self.staged[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.fail_commits {
            self.staged.copy_from_slice(&self.durable);
            return Err(StoreError::CommitFailed("injected commit failure".into()));
        }
        self.durable.copy_from_slice(&self.staged);
        self.commits += 1;
        Ok(())
    }
}

/// Errors from the persistent byte store.
#[derive(Debug)]
pub enum StoreError {
    /// Access outside the store.
    OutOfRange { offset: usize, len: usize, size: usize },
    /// Read from the backing medium failed.
    ReadFailed(String),
    /// Staging a write failed.
    WriteFailed(String),
    /// Commit failed or could not be verified.
    CommitFailed(String),
    /// Record cannot be represented in the persisted layout.
    InvalidRecord(RecordError),
    /// Generic I/O error.
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { offset, len, size } => write!(
                f,
                "access of {} bytes at offset {} exceeds store size {}",
                len, offset, size
            ),
            Self::ReadFailed(msg) => write!(f, "read failed: {}", msg),
            Self::WriteFailed(msg) => write!(f, "write failed: {}", msg),
            Self::CommitFailed(msg) => write!(f, "commit failed: {}", msg),
            Self::InvalidRecord(e) => write!(f, "invalid record: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRecord(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
