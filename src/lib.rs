//! RoverCam ESP32 firmware library.
//!
//! Drives a two-track rover with an ESP32-CAM: an HTTP API steers the
//! motors, serves JPEG snapshots and edits the persisted configuration.
//! Everything above the hardware traits runs and is tested on the host; the
//! ESP-IDF backends are compiled with the `esp32` feature.

pub mod camera;
pub mod config;
pub mod motor;
pub mod network;
pub mod rover;
pub mod server;

// Re-export commonly used items
pub use camera::{Frame, FrameSource, ImageCapture, SimulatedCamera};
pub use config::{ByteStore, ConfigRecord, ConfigStore, FileStore, MemoryStore, MotorPins};
pub use motor::{MotorActuator, MotorCommand, PwmDriver, RecordingPwm};
pub use network::{
    Delay, ModeController, NetworkMode, NetworkStatus, SimulatedRadio, ThreadDelay, WifiRadio,
};
pub use rover::{BootError, Rover, BOOT_FAILURE_RESTART_DELAY};
pub use server::{HttpServer, Outcome, PendingRestart, Request, Response};
