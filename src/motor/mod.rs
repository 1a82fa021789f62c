//! Differential track drive over four PWM channels.
//!
//! Each track is wired to an L298N-style H-bridge with two inputs. Driving a
//! track forward puts PWM on its forward input and holds the backward input
//! low; reverse swaps them; zero coasts with both inputs low.
//!
//! | forward | backward | Track            |
//! |---------|----------|------------------|
//! | 0       | 0        | Coast            |
//! | PWM     | 0        | Forward          |
//! | 0       | PWM      | Reverse          |
//!
//! Both inputs of one track are never high together: that would short the
//! bridge.
//!
//! # Components
//!
//! - [`MotorActuator`] - speed pair to duty-cycle writes
//! - [`PwmDriver`] - channel binding and duty output
//! - [`RecordingPwm`] - in-memory driver for tests and host runs
//! - `ledc` - LEDC peripheral driver (ESP32 only)

#[cfg(feature = "esp32")]
mod ledc;

#[cfg(feature = "esp32")]
pub use ledc::LedcPwm;

use crate::config::{MotorPins, RecordError};
use log::{debug, info};
use std::fmt;

/// PWM carrier frequency for the motor inputs.
pub const PWM_FREQUENCY_HZ: u32 = 5_000;

/// Largest speed magnitude; also the 8-bit duty ceiling.
pub const MAX_SPEED: i32 = 255;

/// One of the four motor driver inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// IN1, left track forward.
    LeftForward,
    /// IN2, left track backward.
    LeftBackward,
    /// IN3, right track forward.
    RightForward,
    /// IN4, right track backward.
    RightBackward,
}

impl Channel {
    /// All channels in IN1..IN4 order.
    pub const ALL: [Channel; 4] = [
        Channel::LeftForward,
        Channel::LeftBackward,
        Channel::RightForward,
        Channel::RightBackward,
    ];

    /// Position in IN1..IN4 order.
    pub fn index(self) -> usize {
        match self {
            Self::LeftForward => 0,
            Self::LeftBackward => 1,
            Self::RightForward => 2,
            Self::RightBackward => 3,
        }
    }

    /// The other input on the same track.
    pub fn partner(self) -> Channel {
        match self {
            Self::LeftForward => Self::LeftBackward,
            Self::LeftBackward => Self::LeftForward,
            Self::RightForward => Self::RightBackward,
            Self::RightBackward => Self::RightForward,
        }
    }
}

/// PWM output abstraction.
///
/// Platform implementations own the peripheral; duty is 8-bit (0-255).
pub trait PwmDriver {
    /// Route `channel` to GPIO `pin` at `frequency_hz`, starting at duty 0.
    fn bind(&mut self, channel: Channel, pin: u8, frequency_hz: u32) -> Result<(), MotorError>;

    /// Stop `channel` and return its pin to the default state.
    fn release(&mut self, channel: Channel) -> Result<(), MotorError>;

    /// Set the duty cycle of a bound channel.
    fn set_duty(&mut self, channel: Channel, duty: u8) -> Result<(), MotorError>;
}

/// Signed speed pair for the two tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorCommand {
    /// Left track, -255 (full reverse) to 255 (full forward).
    pub left: i32,
    /// Right track, -255 (full reverse) to 255 (full forward).
    pub right: i32,
}

impl MotorCommand {
    /// Build a command, clamping both speeds into range.
    pub fn clamped(left: i64, right: i64) -> Self {
        Self {
            left: clamp_speed(left),
            right: clamp_speed(right),
        }
    }
}

/// Clamp a requested speed to [-255, 255].
pub fn clamp_speed(speed: i64) -> i32 {
    speed.clamp(-(MAX_SPEED as i64), MAX_SPEED as i64) as i32
}

/// Motor actuator driving both tracks.
pub struct MotorActuator<P: PwmDriver> {
    pwm: P,
    pins: Option<MotorPins>,
}

impl<P: PwmDriver> MotorActuator<P> {
    /// Create an unconfigured actuator.
    pub fn new(pwm: P) -> Self {
        Self { pwm, pins: None }
    }

    /// Bind the four channels to `pins`.
    ///
    /// Any previous bindings are released first, so this may be called again
    /// after the pin assignment changes.
    pub fn configure(&mut self, pins: &MotorPins) -> Result<(), MotorError> {
        pins.validate().map_err(MotorError::InvalidPins)?;

        if self.pins.take().is_some() {
            for channel in Channel::ALL {
                self.pwm.release(channel)?;
            }
        }

        for (channel, pin) in Channel::ALL.into_iter().zip(pins.as_array()) {
            if let Err(e) = self.pwm.bind(channel, pin, PWM_FREQUENCY_HZ) {
                // Leave nothing half-bound so a later configure starts clean
                for bound in Channel::ALL {
                    let _ = self.pwm.release(bound);
                }
                return Err(e);
            }
        }
        self.pins = Some(*pins);

        info!("Motor pins and PWM configured: {}", pins);
        Ok(())
    }

    /// Current pin assignment, if configured.
    pub fn pins(&self) -> Option<MotorPins> {
        self.pins
    }

    /// Drive both tracks. Speeds outside [-255, 255] are clamped.
    pub fn drive(&mut self, left: i32, right: i32) -> Result<(), MotorError> {
        if self.pins.is_none() {
            return Err(MotorError::NotConfigured);
        }
        let left = clamp_speed(left as i64);
        let right = clamp_speed(right as i64);
        debug!("Drive: left={}, right={}", left, right);

        self.drive_track(Channel::LeftForward, left)?;
        self.drive_track(Channel::RightForward, right)?;
        Ok(())
    }

    /// Apply a [`MotorCommand`].
    pub fn apply(&mut self, command: MotorCommand) -> Result<(), MotorError> {
        self.drive(command.left, command.right)
    }

    /// Coast both tracks.
    pub fn stop(&mut self) -> Result<(), MotorError> {
        self.drive(0, 0)
    }

    /// Borrow the PWM driver.
    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    /// The idle input is always lowered before the active one is raised.
    fn drive_track(&mut self, forward: Channel, speed: i32) -> Result<(), MotorError> {
        let backward = forward.partner();
        let duty = speed.unsigned_abs().min(MAX_SPEED as u32) as u8;

        if speed > 0 {
            self.pwm.set_duty(backward, 0)?;
            self.pwm.set_duty(forward, duty)?;
        } else if speed < 0 {
            self.pwm.set_duty(forward, 0)?;
            self.pwm.set_duty(backward, duty)?;
        } else {
            self.pwm.set_duty(forward, 0)?;
            self.pwm.set_duty(backward, 0)?;
        }
        Ok(())
    }
}

/// In-memory PWM driver.
///
/// Tracks bindings and duty per channel, and flags any moment where both
/// inputs of a track were nonzero.
#[derive(Debug, Default, Clone)]
pub struct RecordingPwm {
    pins: [Option<u8>; 4],
    duty: [u8; 4],
    binds: usize,
    releases: usize,
    writes: usize,
    shoot_through: bool,
}

impl RecordingPwm {
    /// Create a driver with nothing bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current duty of `channel`.
    pub fn duty(&self, channel: Channel) -> u8 {
        self.duty[channel.index()]
    }

    /// Duty of all channels in IN1..IN4 order.
    pub fn duties(&self) -> [u8; 4] {
        self.duty
    }

    /// Pin bound to `channel`.
    pub fn pin(&self, channel: Channel) -> Option<u8> {
        self.pins[channel.index()]
    }

    /// Number of bind calls.
    pub fn bind_count(&self) -> usize {
        self.binds
    }

    /// Number of release calls.
    pub fn release_count(&self) -> usize {
        self.releases
    }

    /// Number of duty writes.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// True if both inputs of a track were ever nonzero at once.
    pub fn saw_shoot_through(&self) -> bool {
        self.shoot_through
    }
}

impl PwmDriver for RecordingPwm {
    fn bind(&mut self, channel: Channel, pin: u8, _frequency_hz: u32) -> Result<(), MotorError> {
        if self.pins[channel.index()].is_some() {
            return Err(MotorError::Hardware(format!("{:?} already bound", channel)));
        }
        self.pins[channel.index()] = Some(pin);
        self.duty[channel.index()] = 0;
        self.binds += 1;
        Ok(())
    }

    fn release(&mut self, channel: Channel) -> Result<(), MotorError> {
        self.pins[channel.index()] = None;
        self.duty[channel.index()] = 0;
        self.releases += 1;
        Ok(())
    }

    fn set_duty(&mut self, channel: Channel, duty: u8) -> Result<(), MotorError> {
        if self.pins[channel.index()].is_none() {
            return Err(MotorError::ChannelUnbound(channel));
        }
        self.duty[channel.index()] = duty;
        self.writes += 1;
        if duty != 0 && self.duty[channel.partner().index()] != 0 {
            self.shoot_through = true;
        }
        Ok(())
    }
}

/// Errors from the motor subsystem.
#[derive(Debug)]
pub enum MotorError {
    /// Drive requested before `configure`.
    NotConfigured,
    /// Pin assignment rejected.
    InvalidPins(RecordError),
    /// Duty written to a channel with no pin.
    ChannelUnbound(Channel),
    /// PWM peripheral error.
    Hardware(String),
}

impl fmt::Display for MotorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "motors not configured"),
            Self::InvalidPins(e) => write!(f, "invalid motor pins: {}", e),
            Self::ChannelUnbound(channel) => write!(f, "{:?} has no pin bound", channel),
            Self::Hardware(msg) => write!(f, "PWM error: {}", msg),
        }
    }
}

impl std::error::Error for MotorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPins(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MOTOR_PINS;

    fn actuator() -> MotorActuator<RecordingPwm> {
        let mut motors = MotorActuator::new(RecordingPwm::new());
        motors.configure(&DEFAULT_MOTOR_PINS).unwrap();
        motors
    }

    #[test]
    fn test_configure_binds_pins_in_order() {
        let motors = actuator();
        let pwm = motors.pwm();
        assert_eq!(pwm.pin(Channel::LeftForward), Some(12));
        assert_eq!(pwm.pin(Channel::LeftBackward), Some(13));
        assert_eq!(pwm.pin(Channel::RightForward), Some(14));
        assert_eq!(pwm.pin(Channel::RightBackward), Some(15));
        assert_eq!(pwm.duties(), [0; 4]);
    }

    #[test]
    fn test_forward_both() {
        let mut motors = actuator();
        motors.drive(100, 200).unwrap();
        assert_eq!(motors.pwm().duties(), [100, 0, 200, 0]);
    }

    #[test]
    fn test_reverse_both() {
        let mut motors = actuator();
        motors.drive(-100, -255).unwrap();
        assert_eq!(motors.pwm().duties(), [0, 100, 0, 255]);
    }

    #[test]
    fn test_spin_in_place() {
        let mut motors = actuator();
        motors.drive(-150, 150).unwrap();
        assert_eq!(motors.pwm().duties(), [0, 150, 150, 0]);
    }

    #[test]
    fn test_direction_reversal_never_overlaps() {
        let mut motors = actuator();
        motors.drive(255, -255).unwrap();
        motors.drive(-255, 255).unwrap();
        motors.drive(255, -255).unwrap();
        assert!(!motors.pwm().saw_shoot_through());
    }

    #[test]
    fn test_no_shoot_through_across_range() {
        let mut motors = actuator();
        for left in (-255..=255).step_by(15) {
            for right in (-255..=255).step_by(17) {
                motors.drive(left, right).unwrap();
                let d = motors.pwm().duties();
                assert!(d[0] == 0 || d[1] == 0, "left overlap at {}", left);
                assert!(d[2] == 0 || d[3] == 0, "right overlap at {}", right);
            }
        }
        for speed in -255..=255 {
            motors.drive(speed, -speed).unwrap();
        }
        assert!(!motors.pwm().saw_shoot_through());
    }

    #[test]
    fn test_stop_zeroes_everything() {
        let mut motors = actuator();
        for (left, right) in [(255, 255), (-255, 40), (7, -1)] {
            motors.drive(left, right).unwrap();
            motors.drive(0, 0).unwrap();
            assert_eq!(motors.pwm().duties(), [0; 4]);
        }
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let mut motors = actuator();
        motors.drive(1000, i32::MIN).unwrap();
        assert_eq!(motors.pwm().duties(), [255, 0, 0, 255]);
    }

    #[test]
    fn test_command_clamped() {
        assert_eq!(
            MotorCommand::clamped(300, -9_000_000_000),
            MotorCommand {
                left: 255,
                right: -255
            }
        );
    }

    #[test]
    fn test_drive_unconfigured() {
        let mut motors = MotorActuator::new(RecordingPwm::new());
        assert!(matches!(motors.drive(10, 10), Err(MotorError::NotConfigured)));
    }

    #[test]
    fn test_reconfigure_releases_old_bindings() {
        let mut motors = actuator();
        motors.drive(120, 120).unwrap();

        let pins = MotorPins {
            in1: 2,
            in2: 4,
            in3: 16,
            in4: 17,
        };
        motors.configure(&pins).unwrap();

        let pwm = motors.pwm();
        assert_eq!(pwm.release_count(), 4);
        assert_eq!(pwm.bind_count(), 8);
        assert_eq!(pwm.pin(Channel::LeftForward), Some(2));
        assert_eq!(pwm.pin(Channel::RightBackward), Some(17));
        assert_eq!(pwm.duties(), [0; 4]);
        assert_eq!(motors.pins(), Some(pins));
    }

    #[test]
    fn test_configure_rejects_camera_pin() {
        let mut motors = actuator();
        let pins = MotorPins {
            in1: 0,
            ..DEFAULT_MOTOR_PINS
        };
        assert!(matches!(
            motors.configure(&pins),
            Err(MotorError::InvalidPins(_))
        ));
        assert_eq!(motors.pins(), Some(DEFAULT_MOTOR_PINS));
        assert_eq!(motors.pwm().release_count(), 0);
    }

    #[test]
    fn test_partner_channels() {
        for channel in Channel::ALL {
            assert_ne!(channel, channel.partner());
            assert_eq!(channel.partner().partner(), channel);
        }
    }
}
