//! LEDC PWM driver for the motor inputs.
//!
//! Uses the raw LEDC API so channels can be re-routed to different GPIOs at
//! runtime. The camera clock occupies LEDC timer 0 / channel 0, so the
//! motors run on timer 1 with channels 2-5.

use super::{Channel, MotorError, PwmDriver};
use esp_idf_sys::{self as sys, esp};

const SPEED_MODE: sys::ledc_mode_t = sys::ledc_mode_t_LEDC_LOW_SPEED_MODE;
const TIMER: sys::ledc_timer_t = sys::ledc_timer_t_LEDC_TIMER_1;
const FIRST_CHANNEL: u32 = 2;

/// LEDC-backed [`PwmDriver`].
pub struct LedcPwm {
    pins: [Option<u8>; 4],
    timer_frequency: Option<u32>,
}

impl LedcPwm {
    /// Create a driver with nothing bound.
    pub fn new() -> Self {
        Self {
            pins: [None; 4],
            timer_frequency: None,
        }
    }

    fn ledc_channel(channel: Channel) -> sys::ledc_channel_t {
        FIRST_CHANNEL + channel.index() as u32
    }

    fn ensure_timer(&mut self, frequency_hz: u32) -> Result<(), MotorError> {
        if self.timer_frequency == Some(frequency_hz) {
            return Ok(());
        }
        let config = sys::ledc_timer_config_t {
            speed_mode: SPEED_MODE,
            duty_resolution: sys::ledc_timer_bit_t_LEDC_TIMER_8_BIT,
            timer_num: TIMER,
            freq_hz: frequency_hz,
            clk_cfg: sys::soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
            ..Default::default()
        };
        esp!(unsafe { sys::ledc_timer_config(&config) }).map_err(hw)?;
        self.timer_frequency = Some(frequency_hz);
        Ok(())
    }
}

impl Default for LedcPwm {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmDriver for LedcPwm {
    fn bind(&mut self, channel: Channel, pin: u8, frequency_hz: u32) -> Result<(), MotorError> {
        self.ensure_timer(frequency_hz)?;
        let config = sys::ledc_channel_config_t {
            gpio_num: pin as i32,
            speed_mode: SPEED_MODE,
            channel: Self::ledc_channel(channel),
            timer_sel: TIMER,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        };
        esp!(unsafe { sys::ledc_channel_config(&config) }).map_err(hw)?;
        self.pins[channel.index()] = Some(pin);
        Ok(())
    }

    fn release(&mut self, channel: Channel) -> Result<(), MotorError> {
        let Some(pin) = self.pins[channel.index()].take() else {
            return Ok(());
        };
        esp!(unsafe { sys::ledc_stop(SPEED_MODE, Self::ledc_channel(channel), 0) }).map_err(hw)?;
        esp!(unsafe { sys::gpio_reset_pin(pin as i32) }).map_err(hw)?;
        Ok(())
    }

    fn set_duty(&mut self, channel: Channel, duty: u8) -> Result<(), MotorError> {
        if self.pins[channel.index()].is_none() {
            return Err(MotorError::ChannelUnbound(channel));
        }
        let ledc_channel = Self::ledc_channel(channel);
        esp!(unsafe { sys::ledc_set_duty(SPEED_MODE, ledc_channel, duty as u32) }).map_err(hw)?;
        esp!(unsafe { sys::ledc_update_duty(SPEED_MODE, ledc_channel) }).map_err(hw)?;
        Ok(())
    }
}

fn hw(e: sys::EspError) -> MotorError {
    MotorError::Hardware(format!("{:?}", e))
}
