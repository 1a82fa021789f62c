//! The rover device controller.
//!
//! [`Rover`] owns every piece of device state: the configuration record and
//! its store, the motor actuator, the capture adapter and the radio. Request
//! handlers borrow it mutably one request at a time, so no locking is
//! needed.
//!
//! # Usage
//!
//! ```
//! use rover_cam_esp32::camera::SimulatedCamera;
//! use rover_cam_esp32::config::MemoryStore;
//! use rover_cam_esp32::motor::RecordingPwm;
//! use rover_cam_esp32::network::{NetworkMode, RecordingDelay, SimulatedRadio};
//! use rover_cam_esp32::server::Request;
//! use rover_cam_esp32::Rover;
//!
//! let mut rover = Rover::boot(
//!     MemoryStore::default(),
//!     RecordingPwm::new(),
//!     SimulatedCamera::default(),
//!     SimulatedRadio::unreachable(),
//!     &mut RecordingDelay::default(),
//! )
//! .unwrap();
//! assert_eq!(rover.network().mode, NetworkMode::AccessPoint);
//!
//! let outcome = rover.handle(&Request::get("/control?left=120&right=-120"));
//! assert_eq!(outcome.response.status, 200);
//! ```

use crate::camera::{FrameSource, ImageCapture};
use crate::config::{ByteStore, ConfigRecord, ConfigStore, StoreError};
use crate::motor::{MotorActuator, MotorError, PwmDriver};
use crate::network::{Delay, ModeController, NetworkStatus, RadioError, WifiRadio};
use log::info;
use std::fmt;
use std::time::Duration;

/// Wait before rebooting after a boot failure.
pub const BOOT_FAILURE_RESTART_DELAY: Duration = Duration::from_secs(3);

/// Device controller state.
pub struct Rover<S, P, F, R>
where
    S: ByteStore,
    P: PwmDriver,
    F: FrameSource,
    R: WifiRadio,
{
    pub(crate) config: ConfigRecord,
    pub(crate) store: ConfigStore<S>,
    pub(crate) motors: MotorActuator<P>,
    pub(crate) camera: ImageCapture<F>,
    pub(crate) radio: R,
    pub(crate) network: NetworkStatus,
}

impl<S, P, F, R> Rover<S, P, F, R>
where
    S: ByteStore,
    P: PwmDriver,
    F: FrameSource,
    R: WifiRadio,
{
    /// Bring the rover up: load configuration, configure motors, then pick
    /// the network mode.
    ///
    /// `camera` must already be initialized; a sensor that fails to start is
    /// handled by the caller before boot.
    pub fn boot<D: Delay>(
        store: S,
        pwm: P,
        camera: F,
        mut radio: R,
        delay: &mut D,
    ) -> Result<Self, BootError> {
        let mut store = ConfigStore::new(store);
        let config = store.load();

        let mut motors = MotorActuator::new(pwm);
        motors.configure(&config.motor_pins)?;

        let network = ModeController::new().run(&mut radio, delay, &config)?;
        info!("Network ready: mode={}, ip={}", network.mode, network.ip);

        Ok(Self {
            config,
            store,
            motors,
            camera: ImageCapture::new(camera),
            radio,
            network,
        })
    }

    /// Current configuration (may be unsaved defaults).
    pub fn config(&self) -> &ConfigRecord {
        &self.config
    }

    /// Network mode chosen at boot.
    pub fn network(&self) -> &NetworkStatus {
        &self.network
    }

    /// Motor actuator.
    pub fn motors(&self) -> &MotorActuator<P> {
        &self.motors
    }

    /// Capture adapter.
    pub fn camera(&self) -> &ImageCapture<F> {
        &self.camera
    }

    /// Mutable capture adapter.
    pub fn camera_mut(&mut self) -> &mut ImageCapture<F> {
        &mut self.camera
    }

    /// Configuration store.
    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    /// Mutable configuration store.
    pub fn store_mut(&mut self) -> &mut ConfigStore<S> {
        &mut self.store
    }

    /// Radio.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable radio.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Persist `candidate` and adopt it. On failure the current record is
    /// kept as it was.
    pub(crate) fn persist(&mut self, mut candidate: ConfigRecord) -> Result<(), StoreError> {
        self.store.save(&mut candidate)?;
        self.config = candidate;
        Ok(())
    }
}

/// Errors that stop the rover from booting.
#[derive(Debug)]
pub enum BootError {
    /// PWM setup failed.
    Motor(MotorError),
    /// Access point could not be started.
    Network(RadioError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Motor(e) => write!(f, "motor init failed: {}", e),
            Self::Network(e) => write!(f, "network init failed: {}", e),
        }
    }
}

impl std::error::Error for BootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Motor(e) => Some(e),
            Self::Network(e) => Some(e),
        }
    }
}

impl From<MotorError> for BootError {
    fn from(e: MotorError) -> Self {
        Self::Motor(e)
    }
}

impl From<RadioError> for BootError {
    fn from(e: RadioError) -> Self {
        Self::Network(e)
    }
}
