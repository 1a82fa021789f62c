//! Persistent rover configuration.
//!
//! # Components
//!
//! - [`record`] - the fixed-layout [`ConfigRecord`] and its validation rules
//! - [`store`] - [`ConfigStore`] load/save over any [`ByteStore`]
//! - [`file_store`] - file-backed store for host runs
//! - `nvs` - NVS-backed store (ESP32 only)

pub mod file_store;
pub mod record;
pub mod store;

#[cfg(feature = "esp32")]
mod nvs;

pub use file_store::{default_store_path, FileStore};
pub use record::{
    validate_access_point, validate_station, ConfigRecord, MotorPins, RecordError,
    CAMERA_RESERVED_PINS, DEFAULT_AP_PASSWORD, DEFAULT_AP_SSID, DEFAULT_MOTOR_PINS,
    MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN, RECORD_LEN,
};
pub use store::{ByteStore, ConfigStore, MemoryStore, StoreError, RECORD_OFFSET};

#[cfg(feature = "esp32")]
pub use nvs::{init_nvs, NvsStore};
