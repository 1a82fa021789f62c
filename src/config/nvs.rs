//! NVS-backed byte store.
//!
//! Emulates a small EEPROM region inside ESP32's Non-Volatile Storage (NVS):
//! the whole region is one blob, staged in RAM and written on commit.

use super::store::{ByteStore, StoreError};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::info;

/// NVS namespace for the rover configuration.
const NVS_NAMESPACE: &str = "rover";

/// NVS key holding the emulated EEPROM region.
const NVS_KEY: &str = "eeprom";

/// Byte store backed by a single NVS blob.
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
    buf: Vec<u8>,
}

impl NvsStore {
    /// Open the region, reading any existing blob. A missing blob reads as
    /// erased flash (`0xFF`).
    pub fn open(nvs: EspNvs<NvsDefault>, size: usize) -> Result<Self, EspError> {
        let mut buf = vec![0xFF; size];
        let mut raw = vec![0u8; size];
        match nvs.get_raw(NVS_KEY, &mut raw) {
            Ok(Some(bytes)) => {
                let len = bytes.len().min(size);
                buf[..len].copy_from_slice(&bytes[..len]);
            }
            Ok(None) => log::debug!("No configuration blob in NVS"),
            Err(e) => log::warn!("Failed to read configuration blob: {:?}", e),
        }
        Ok(Self { nvs, buf })
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, StoreError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(offset..end),
            _ => Err(StoreError::OutOfRange {
                offset,
                len,
                size: self.buf.len(),
            }),
        }
    }
}

impl ByteStore for NvsStore {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.buf[range]);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        let range = self.range(offset, bytes.len())?;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Write the region and read it back to catch silent flash failures.
    fn commit(&mut self) -> Result<(), StoreError> {
        self.nvs
            .set_raw(NVS_KEY, &self.buf)
            .map_err(|e| StoreError::CommitFailed(format!("{:?}", e)))?;

        let mut verify = vec![0u8; self.buf.len()];
        let read_back = self
            .nvs
            .get_raw(NVS_KEY, &mut verify)
            .map_err(|e| StoreError::CommitFailed(format!("read-back: {:?}", e)))?
            .ok_or_else(|| StoreError::CommitFailed("blob missing after commit".into()))?;

        if read_back != self.buf.as_slice() {
            log::error!("Configuration verification failed - data mismatch after commit");
            return Err(StoreError::CommitFailed("data mismatch after commit".into()));
        }

        info!("Configuration committed to NVS");
        Ok(())
    }
}

/// Initialize the NVS namespace used for the configuration region.
pub fn init_nvs() -> Result<EspNvs<NvsDefault>, EspError> {
    let partition = EspNvsPartition::<NvsDefault>::take()?;
    EspNvs::new(partition, NVS_NAMESPACE, true)
}
