//! Wireless mode selection.
//!
//! At boot the rover either joins the configured network (station mode) or
//! opens its own access point. A station attempt that does not associate
//! within a fixed number of polls is torn down and replaced by the access
//! point, so the rover is always reachable one way or the other.
//!
//! ```text
//!  Init ──(no station SSID)──────────────────────────► AccessPoint
//!   │                                                      ▲
//!   └──(station SSID)──► TryStation ──(20 polls failed)────┘
//!                            │
//!                            └──(connected)──► StationConnected
//! ```
//!
//! Both end states are final until the next restart. Changing credentials
//! means persisting them and rebooting, which re-enters `Init`.
//!
//! # Example
//!
//! ```
//! use rover_cam_esp32::config::ConfigRecord;
//! use rover_cam_esp32::network::{ModeController, NetworkMode, RecordingDelay, SimulatedRadio};
//!
//! let mut radio = SimulatedRadio::unreachable();
//! let mut delay = RecordingDelay::default();
//! let mut config = ConfigRecord::default();
//! config.set_station("Home", "").unwrap();
//!
//! let status = ModeController::new().run(&mut radio, &mut delay, &config).unwrap();
//! assert_eq!(status.mode, NetworkMode::AccessPoint);
//! assert_eq!(status.attempts, 20);
//! ```

mod sim;

#[cfg(feature = "esp32")]
mod wifi;

pub use sim::{RecordingDelay, SimulatedRadio, StationBehaviour};

#[cfg(feature = "esp32")]
pub use wifi::EspRadio;

use crate::config::ConfigRecord;
use log::{info, warn};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Station association polls before falling back to the access point.
pub const MAX_CONNECT_ATTEMPTS: u32 = 20;

/// Wait before each association poll.
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wireless stack operations needed for mode selection and scanning.
pub trait WifiRadio {
    /// Start associating with a network. Returns once the attempt is under
    /// way, not when it completes.
    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// Poll association status.
    fn is_station_connected(&mut self) -> bool;

    /// Address assigned in station mode.
    fn station_ip(&self) -> Option<Ipv4Addr>;

    /// Abandon a station attempt and switch the radio off.
    fn teardown_station(&mut self) -> Result<(), RadioError>;

    /// Start broadcasting an access point. An empty password opens it.
    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<Ipv4Addr, RadioError>;

    /// Synchronous scan for nearby networks, in discovery order.
    fn scan(&mut self) -> Result<Vec<ScanEntry>, RadioError>;
}

/// Blocking wait, injectable so tests do not sleep.
pub trait Delay {
    /// Block for `duration`.
    fn delay(&mut self, duration: Duration);
}

/// [`Delay`] backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// One network found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Network name.
    pub ssid: String,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// True for networks without authentication.
    pub open: bool,
}

/// Which side of the radio the rover is reachable on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Rover runs its own network.
    AccessPoint,
    /// Rover joined an existing network.
    Station,
}

impl NetworkMode {
    /// Short name used by the config API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessPoint => "ap",
            Self::Station => "sta",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mode selection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    /// Nothing decided yet.
    Init,
    /// Associating with the stored network.
    TryStation,
    /// Access point running.
    AccessPoint,
    /// Joined the stored network.
    StationConnected,
}

impl ModeState {
    /// True for states that end the boot sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AccessPoint | Self::StationConnected)
    }
}

/// Outcome of mode selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    /// Active mode.
    pub mode: NetworkMode,
    /// Address the API is reachable at.
    pub ip: Ipv4Addr,
    /// Station polls made (0 when no station attempt happened).
    pub attempts: u32,
    /// True when a station attempt failed and the access point took over.
    pub fell_back: bool,
}

/// Bounded-retry station/access-point selector.
#[derive(Debug)]
pub struct ModeController {
    state: ModeState,
    max_attempts: u32,
    poll_interval: Duration,
    history: Vec<ModeState>,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    /// Controller with the standard 20 × 500 ms station budget.
    pub fn new() -> Self {
        Self::with_policy(MAX_CONNECT_ATTEMPTS, CONNECT_POLL_INTERVAL)
    }

    /// Controller with a custom station budget.
    pub fn with_policy(max_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            state: ModeState::Init,
            max_attempts,
            poll_interval,
            history: vec![ModeState::Init],
        }
    }

    /// Current state.
    pub fn state(&self) -> ModeState {
        self.state
    }

    /// Every state visited, starting with `Init`.
    pub fn history(&self) -> &[ModeState] {
        &self.history
    }

    /// Run from `Init` to a terminal state.
    ///
    /// Only an access point that fails to start is an error; a station that
    /// cannot connect falls back instead.
    pub fn run<R, D>(
        &mut self,
        radio: &mut R,
        delay: &mut D,
        config: &ConfigRecord,
    ) -> Result<NetworkStatus, RadioError>
    where
        R: WifiRadio,
        D: Delay,
    {
        if !config.has_station() {
            info!("No station network configured");
            let ip = self.start_access_point(radio, config)?;
            return Ok(NetworkStatus {
                mode: NetworkMode::AccessPoint,
                ip,
                attempts: 0,
                fell_back: false,
            });
        }

        self.enter(ModeState::TryStation);
        info!("Connecting to WiFi: {}", config.station_ssid);

        let attempts = match radio.begin_station(&config.station_ssid, &config.station_password) {
            Ok(()) => match self.poll_station(radio, delay) {
                Ok(attempts) => {
                    self.enter(ModeState::StationConnected);
                    let ip = radio.station_ip().unwrap_or(Ipv4Addr::UNSPECIFIED);
                    info!("Connected to WiFi after {} poll(s), IP: {}", attempts, ip);
                    return Ok(NetworkStatus {
                        mode: NetworkMode::Station,
                        ip,
                        attempts,
                        fell_back: false,
                    });
                }
                Err(attempts) => {
                    warn!(
                        "Failed to connect to {} after {} attempts",
                        config.station_ssid, attempts
                    );
                    attempts
                }
            },
            Err(e) => {
                warn!("Could not start station mode: {}", e);
                0
            }
        };

        if let Err(e) = radio.teardown_station() {
            warn!("Station teardown failed: {}", e);
        }
        info!("Falling back to access point mode");
        let ip = self.start_access_point(radio, config)?;
        Ok(NetworkStatus {
            mode: NetworkMode::AccessPoint,
            ip,
            attempts,
            fell_back: true,
        })
    }

    /// Ok with the attempt number that connected, Err with attempts spent.
    fn poll_station<R, D>(&self, radio: &mut R, delay: &mut D) -> Result<u32, u32>
    where
        R: WifiRadio,
        D: Delay,
    {
        for attempt in 1..=self.max_attempts {
            delay.delay(self.poll_interval);
            if radio.is_station_connected() {
                return Ok(attempt);
            }
            log::debug!("Station poll {}/{}", attempt, self.max_attempts);
        }
        Err(self.max_attempts)
    }

    fn start_access_point<R: WifiRadio>(
        &mut self,
        radio: &mut R,
        config: &ConfigRecord,
    ) -> Result<Ipv4Addr, RadioError> {
        info!("Starting access point: {}", config.ap_ssid);
        let ip = radio.start_access_point(&config.ap_ssid, &config.ap_password)?;
        self.enter(ModeState::AccessPoint);
        info!("AP IP address: {}", ip);
        Ok(ip)
    }

    fn enter(&mut self, state: ModeState) {
        self.state = state;
        self.history.push(state);
    }
}

/// Errors from the wireless stack.
#[derive(Debug)]
pub enum RadioError {
    /// SSID is invalid (too long or contains invalid characters).
    InvalidSsid,
    /// Password is invalid.
    InvalidPassword,
    /// Driver refused an operation.
    Driver(String),
    /// Scan failed.
    ScanFailed(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::Driver(msg) => write!(f, "WiFi driver error: {}", msg),
            Self::ScanFailed(msg) => write!(f, "scan failed: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}
