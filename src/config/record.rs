//! Persisted rover configuration record.
//!
//! The record has a fixed 201-byte layout so it can live at offset 0 of a
//! raw byte store:
//!
//! ```text
//! [station_ssid:33][station_password:65][ap_ssid:33][ap_password:65]
//! [in1:1][in2:1][in3:1][in4:1][saved:1]
//! ```
//!
//! Strings are NUL-terminated and zero-padded. There is no version field;
//! the only marker of a valid record is the `saved` byte being exactly `1`.
//!
//! # Example
//!
//! ```
//! use rover_cam_esp32::config::ConfigRecord;
//!
//! let mut record = ConfigRecord::default();
//! assert!(!record.saved);
//! record.set_station("Home", "").unwrap();
//!
//! let bytes = record.to_bytes().unwrap();
//! let restored = ConfigRecord::from_bytes(&bytes);
//! // Not marked as saved, so it does not decode as a valid record.
//! assert!(restored.is_err());
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for a secured access point.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Access point name used until the user configures one.
pub const DEFAULT_AP_SSID: &str = "RoverCam-Hotspot";

/// Access point password used until the user configures one.
pub const DEFAULT_AP_PASSWORD: &str = "rover1234";

/// Default L298N inputs: left fwd, left bwd, right fwd, right bwd.
pub const DEFAULT_MOTOR_PINS: MotorPins = MotorPins {
    in1: 12,
    in2: 13,
    in3: 14,
    in4: 15,
};

/// GPIOs wired to the OV2640 on the AI Thinker ESP32-CAM board.
pub const CAMERA_RESERVED_PINS: [u8; 15] = [32, 0, 26, 27, 35, 34, 39, 36, 21, 19, 18, 5, 25, 23, 22];

/// GPIOs 6-11 drive the on-module SPI flash.
const FLASH_PINS: std::ops::RangeInclusive<u8> = 6..=11;

/// GPIOs above this number are input-only on the ESP32.
const MAX_OUTPUT_PIN: u8 = 33;

const SSID_FIELD: usize = MAX_SSID_LEN + 1;
const PASSWORD_FIELD: usize = MAX_PASSWORD_LEN + 1;

const STA_SSID_AT: usize = 0;
const STA_PASSWORD_AT: usize = STA_SSID_AT + SSID_FIELD;
const AP_SSID_AT: usize = STA_PASSWORD_AT + PASSWORD_FIELD;
const AP_PASSWORD_AT: usize = AP_SSID_AT + SSID_FIELD;
const PINS_AT: usize = AP_PASSWORD_AT + PASSWORD_FIELD;
const SAVED_AT: usize = PINS_AT + 4;

/// Size of the persisted record in bytes.
pub const RECORD_LEN: usize = SAVED_AT + 1;

/// Motor driver input pin assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroize)]
pub struct MotorPins {
    /// Left motor forward.
    pub in1: u8,
    /// Left motor backward.
    pub in2: u8,
    /// Right motor forward.
    pub in3: u8,
    /// Right motor backward.
    pub in4: u8,
}

impl MotorPins {
    /// Pins in channel order (IN1..IN4).
    pub fn as_array(&self) -> [u8; 4] {
        [self.in1, self.in2, self.in3, self.in4]
    }

    /// Check that every pin is a usable output and no pin is repeated.
    pub fn validate(&self) -> Result<(), RecordError> {
        let pins = self.as_array();
        for (i, &pin) in pins.iter().enumerate() {
            if pin > MAX_OUTPUT_PIN || FLASH_PINS.contains(&pin) {
                return Err(RecordError::PinNotOutput { pin });
            }
            if CAMERA_RESERVED_PINS.contains(&pin) {
                return Err(RecordError::PinReserved { pin });
            }
            if pins[..i].contains(&pin) {
                return Err(RecordError::DuplicatePin { pin });
            }
        }
        Ok(())
    }
}

impl fmt::Display for MotorPins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IN1={}, IN2={}, IN3={}, IN4={}",
            self.in1, self.in2, self.in3, self.in4
        )
    }
}

/// Network credentials and motor pins, persisted across power cycles.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ConfigRecord {
    /// Network to join in station mode. Empty means none configured.
    pub station_ssid: String,
    /// Station password. Empty for open networks.
    pub station_password: String,
    /// Name of the rover's own access point.
    pub ap_ssid: String,
    /// Access point password. Empty or at least 8 bytes.
    pub ap_password: String,
    /// Motor driver pin assignment.
    pub motor_pins: MotorPins,
    /// Set once the record has been explicitly saved.
    pub saved: bool,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            station_ssid: String::new(),
            station_password: String::new(),
            ap_ssid: DEFAULT_AP_SSID.to_string(),
            ap_password: DEFAULT_AP_PASSWORD.to_string(),
            motor_pins: DEFAULT_MOTOR_PINS,
            saved: false,
        }
    }
}

impl fmt::Debug for ConfigRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRecord")
            .field("station_ssid", &self.station_ssid)
            .field("station_password", &"<redacted>")
            .field("ap_ssid", &self.ap_ssid)
            .field("ap_password", &"<redacted>")
            .field("motor_pins", &self.motor_pins)
            .field("saved", &self.saved)
            .finish()
    }
}

impl ConfigRecord {
    /// True when station credentials are configured.
    pub fn has_station(&self) -> bool {
        !self.station_ssid.is_empty()
    }

    /// Replace station credentials after validating them.
    pub fn set_station(&mut self, ssid: &str, password: &str) -> Result<(), RecordError> {
        validate_station(ssid, password)?;
        self.station_ssid = ssid.to_string();
        self.station_password = password.to_string();
        Ok(())
    }

    /// Replace access point identity after validating it.
    pub fn set_access_point(&mut self, ssid: &str, password: &str) -> Result<(), RecordError> {
        validate_access_point(ssid, password)?;
        self.ap_ssid = ssid.to_string();
        self.ap_password = password.to_string();
        Ok(())
    }

    /// Check every field against the rules the persisted layout can
    /// represent.
    ///
    /// The station SSID may be empty (no station configured); all other
    /// rules match [`validate_station`] and [`validate_access_point`].
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.has_station() {
            validate_station(&self.station_ssid, &self.station_password)?;
        } else {
            validate_password(&self.station_password, "station password")?;
        }
        validate_access_point(&self.ap_ssid, &self.ap_password)?;
        self.motor_pins.validate()
    }

    /// Serialize to the fixed persisted layout.
    ///
    /// Fails instead of truncating when a field does not fit or would not
    /// decode back to the same value.
    pub fn to_bytes(&self) -> Result<[u8; RECORD_LEN], RecordError> {
        self.validate()?;
        let mut bytes = [0u8; RECORD_LEN];
        put_str(&mut bytes[STA_SSID_AT..STA_PASSWORD_AT], &self.station_ssid);
        put_str(&mut bytes[STA_PASSWORD_AT..AP_SSID_AT], &self.station_password);
        put_str(&mut bytes[AP_SSID_AT..AP_PASSWORD_AT], &self.ap_ssid);
        put_str(&mut bytes[AP_PASSWORD_AT..PINS_AT], &self.ap_password);
        bytes[PINS_AT..SAVED_AT].copy_from_slice(&self.motor_pins.as_array());
        bytes[SAVED_AT] = u8::from(self.saved);
        Ok(bytes)
    }

    /// Deserialize a saved record.
    ///
    /// Fails with [`RecordError::NotSaved`] for blank or never-written
    /// storage, and with a format error when a flagged record does not hold
    /// well-formed fields.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < RECORD_LEN {
            return Err(RecordError::InvalidFormat(format!(
                "record truncated: {} bytes (need {})",
                bytes.len(),
                RECORD_LEN
            )));
        }
        if bytes[SAVED_AT] != 1 {
            return Err(RecordError::NotSaved);
        }

        let motor_pins = MotorPins {
            in1: bytes[PINS_AT],
            in2: bytes[PINS_AT + 1],
            in3: bytes[PINS_AT + 2],
            in4: bytes[PINS_AT + 3],
        };

        let record = Self {
            station_ssid: get_str(&bytes[STA_SSID_AT..STA_PASSWORD_AT], "station SSID")?,
            station_password: get_str(&bytes[STA_PASSWORD_AT..AP_SSID_AT], "station password")?,
            ap_ssid: get_str(&bytes[AP_SSID_AT..AP_PASSWORD_AT], "AP SSID")?,
            ap_password: get_str(&bytes[AP_PASSWORD_AT..PINS_AT], "AP password")?,
            motor_pins,
            saved: true,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Validate station credentials. An empty password selects an open network.
pub fn validate_station(ssid: &str, password: &str) -> Result<(), RecordError> {
    validate_ssid(ssid)?;
    validate_password(password, "password")
}

/// Validate access point identity. The password is empty or WPA2-sized.
pub fn validate_access_point(ssid: &str, password: &str) -> Result<(), RecordError> {
    validate_ssid(ssid)?;
    if !password.is_empty() && password.len() < MIN_PASSWORD_LEN {
        return Err(RecordError::PasswordTooShort {
            len: password.len(),
            min: MIN_PASSWORD_LEN,
        });
    }
    validate_password(password, "password")
}

fn validate_ssid(ssid: &str) -> Result<(), RecordError> {
    if ssid.is_empty() {
        return Err(RecordError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(RecordError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    validate_text(ssid, "SSID")
}

fn validate_password(password: &str, field: &'static str) -> Result<(), RecordError> {
    if password.len() > MAX_PASSWORD_LEN {
        return Err(RecordError::PasswordTooLong {
            len: password.len(),
            max: MAX_PASSWORD_LEN,
        });
    }
    validate_text(password, field)
}

/// Stored strings end at the first NUL, so control characters never make it
/// into a record.
fn validate_text(value: &str, field: &'static str) -> Result<(), RecordError> {
    if value.chars().any(char::is_control) {
        return Err(RecordError::ControlCharacter { field });
    }
    Ok(())
}

/// `value` has already passed validation, so it fits with its terminator.
fn put_str(field: &mut [u8], value: &str) {
    field[..value.len()].copy_from_slice(value.as_bytes());
}

fn get_str(field: &[u8], name: &str) -> Result<String, RecordError> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| RecordError::InvalidFormat(format!("unterminated {}", name)))?;
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| RecordError::InvalidFormat(format!("invalid {} UTF-8", name)))
}

/// Errors from validating or decoding a configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// NUL or another control character in a credential.
    ControlCharacter { field: &'static str },
    /// Pin is used by the camera.
    PinReserved { pin: u8 },
    /// Pin cannot drive an output.
    PinNotOutput { pin: u8 },
    /// Same pin assigned to more than one input.
    DuplicatePin { pin: u8 },
    /// Storage has never been saved.
    NotSaved,
    /// Invalid data format during deserialization.
    InvalidFormat(String),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::ControlCharacter { field } => {
                write!(f, "{} must not contain control characters", field)
            }
            Self::PinReserved { pin } => write!(f, "GPIO{} is reserved for the camera", pin),
            Self::PinNotOutput { pin } => write!(f, "GPIO{} cannot be used as a motor output", pin),
            Self::DuplicatePin { pin } => write!(f, "GPIO{} assigned more than once", pin),
            Self::NotSaved => write!(f, "no saved configuration"),
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for RecordError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved_record() -> ConfigRecord {
        let mut record = ConfigRecord::default();
        record.set_station("Home", "hunter22").unwrap();
        record.set_access_point("Rover-7", "").unwrap();
        record.motor_pins = MotorPins {
            in1: 2,
            in2: 4,
            in3: 14,
            in4: 15,
        };
        record.saved = true;
        record
    }

    // ==================== Layout Tests ====================

    #[test]
    fn test_record_len() {
        assert_eq!(RECORD_LEN, 201);
        assert_eq!(ConfigRecord::default().to_bytes().unwrap().len(), RECORD_LEN);
    }

    #[test]
    fn test_saved_record_decodes() {
        let record = saved_record();
        let restored = ConfigRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_max_length_fields_survive() {
        let mut record = saved_record();
        record.set_station(&"s".repeat(32), &"p".repeat(64)).unwrap();
        record.set_access_point(&"a".repeat(32), &"q".repeat(64)).unwrap();
        let restored = ConfigRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.station_ssid.len(), 32);
        assert_eq!(restored.ap_password.len(), 64);
    }

    #[test]
    fn test_unsaved_is_rejected() {
        let bytes = ConfigRecord::default().to_bytes().unwrap();
        assert_eq!(ConfigRecord::from_bytes(&bytes), Err(RecordError::NotSaved));
    }

    #[test]
    fn test_erased_flash_is_rejected() {
        let bytes = [0xFFu8; RECORD_LEN];
        assert_eq!(ConfigRecord::from_bytes(&bytes), Err(RecordError::NotSaved));
    }

    #[test]
    fn test_truncated_is_rejected() {
        let bytes = saved_record().to_bytes().unwrap();
        let result = ConfigRecord::from_bytes(&bytes[..100]);
        assert!(matches!(result, Err(RecordError::InvalidFormat(_))));
    }

    #[test]
    fn test_garbage_with_flag_is_rejected() {
        let mut bytes = [0xA5u8; RECORD_LEN];
        bytes[SAVED_AT] = 1;
        assert!(ConfigRecord::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_unterminated_string_is_rejected() {
        let mut bytes = saved_record().to_bytes().unwrap();
        bytes[STA_SSID_AT..STA_PASSWORD_AT].fill(b'x');
        let result = ConfigRecord::from_bytes(&bytes);
        assert!(matches!(result, Err(RecordError::InvalidFormat(_))));
    }

    // ==================== Credential Tests ====================

    #[test]
    fn test_station_open_network() {
        assert!(validate_station("Home", "").is_ok());
    }

    #[test]
    fn test_station_short_password_allowed() {
        assert!(validate_station("Home", "abc").is_ok());
    }

    #[test]
    fn test_station_empty_ssid() {
        assert_eq!(validate_station("", "password"), Err(RecordError::SsidEmpty));
    }

    #[test]
    fn test_ssid_too_long() {
        let result = validate_station(&"a".repeat(33), "");
        assert!(matches!(result, Err(RecordError::SsidTooLong { len: 33, .. })));
    }

    #[test]
    fn test_station_password_too_long() {
        let result = validate_station("Home", &"a".repeat(65));
        assert!(matches!(result, Err(RecordError::PasswordTooLong { .. })));
    }

    #[test]
    fn test_ap_password_too_short() {
        let result = validate_access_point("Rover", "short");
        assert_eq!(result, Err(RecordError::PasswordTooShort { len: 5, min: 8 }));
    }

    #[test]
    fn test_ap_open_and_min_length() {
        assert!(validate_access_point("Rover", "").is_ok());
        assert!(validate_access_point("Rover", "12345678").is_ok());
    }

    #[test]
    fn test_set_station_leaves_record_on_error() {
        let mut record = ConfigRecord::default();
        assert!(record.set_station("", "x").is_err());
        assert_eq!(record, ConfigRecord::default());
    }

    // ==================== Pin Tests ====================

    #[test]
    fn test_default_pins_valid() {
        assert!(DEFAULT_MOTOR_PINS.validate().is_ok());
    }

    #[test]
    fn test_camera_pin_rejected() {
        let pins = MotorPins { in1: 26, ..DEFAULT_MOTOR_PINS };
        assert_eq!(pins.validate(), Err(RecordError::PinReserved { pin: 26 }));
    }

    #[test]
    fn test_input_only_pin_rejected() {
        let pins = MotorPins { in4: 38, ..DEFAULT_MOTOR_PINS };
        assert_eq!(pins.validate(), Err(RecordError::PinNotOutput { pin: 38 }));
    }

    #[test]
    fn test_flash_pin_rejected() {
        let pins = MotorPins { in2: 7, ..DEFAULT_MOTOR_PINS };
        assert_eq!(pins.validate(), Err(RecordError::PinNotOutput { pin: 7 }));
    }

    #[test]
    fn test_duplicate_pin_rejected() {
        let pins = MotorPins { in3: 12, ..DEFAULT_MOTOR_PINS };
        assert_eq!(pins.validate(), Err(RecordError::DuplicatePin { pin: 12 }));
    }

    #[test]
    fn test_nul_in_credentials_rejected() {
        assert_eq!(
            validate_access_point("\0Rover", ""),
            Err(RecordError::ControlCharacter { field: "SSID" })
        );
        assert_eq!(
            validate_access_point("Rover", &"\0".repeat(8)),
            Err(RecordError::ControlCharacter { field: "password" })
        );
        assert!(validate_station("Ho\0me", "").is_err());
        assert!(validate_station("Home", "pass\nword").is_err());
    }

    #[test]
    fn test_accepted_credentials_survive_encoding() {
        let mut record = saved_record();
        record.set_station("Café ☕", "pässwörd").unwrap();
        record.set_access_point("Rover 7", "12345678").unwrap();
        let restored = ConfigRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_oversize_field_is_not_truncated() {
        let mut record = saved_record();
        // 31 ASCII bytes plus a two-byte character: 33 bytes
        record.ap_ssid = format!("{}é", "a".repeat(31));
        assert!(matches!(
            record.to_bytes(),
            Err(RecordError::SsidTooLong { len: 33, .. })
        ));
    }

    #[test]
    fn test_field_assignment_bypassing_setters_is_checked() {
        let mut record = saved_record();
        record.ap_password = "\0\0\0\0\0\0\0\0".to_string();
        assert!(record.to_bytes().is_err());
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let debug = format!("{:?}", saved_record());
        assert!(debug.contains("Home"));
        assert!(!debug.contains("hunter22"));
    }
}
