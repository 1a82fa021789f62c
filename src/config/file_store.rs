//! File-backed byte store for host (development) builds.
//!
//! Emulates the device's persistent region in a single file so host runs
//! keep their configuration across restarts.
//! Uses `~/.rover-cam-esp32/config.bin` by default.

use super::store::{ByteStore, StoreError};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default store file path.
///
/// Returns `~/.rover-cam-esp32/config.bin`
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".rover-cam-esp32")
        .join("config.bin"))
}

/// Byte store persisted to a file.
///
/// Writes are staged in memory and written out on commit, then read back to
/// verify.
pub struct FileStore {
    path: PathBuf,
    buf: Vec<u8>,
}

impl FileStore {
    /// Open a store of `size` bytes at `path`.
    ///
    /// A missing file yields an erased (`0xFF`) region.
    pub fn open(path: impl Into<PathBuf>, size: usize) -> io::Result<Self> {
        let path = path.into();
        let mut buf = vec![0xFF; size];
        match fs::read(&path) {
            Ok(contents) => {
                let len = contents.len().min(size);
                buf[..len].copy_from_slice(&contents[..len]);
                debug!("Opened store {:?} ({} bytes on disk)", path, contents.len());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No store file at {:?}, starting erased", path);
            }
            Err(e) => return Err(e),
        }
        Ok(Self { path, buf })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStore for FileStore {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= self.buf.len())
            .ok_or(StoreError::OutOfRange {
                offset,
                len: buf.len(),
                size: self.buf.len(),
            })?;
        buf.copy_from_slice(&self.buf[offset..end]);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.buf.len())
            .ok_or(StoreError::OutOfRange {
                offset,
                len: bytes.len(),
                size: self.buf.len(),
            })?;
        self.buf[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &self.buf)?;

        // Verify write by reading back
        let read_back = fs::read(&self.path)?;
        if read_back != self.buf {
            return Err(StoreError::CommitFailed(format!(
                "verification failed: wrote {} bytes, read {} bytes",
                self.buf.len(),
                read_back.len()
            )));
        }

        info!("Store committed to {:?}", self.path);
        Ok(())
    }
}
