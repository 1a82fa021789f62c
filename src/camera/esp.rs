//! esp32-camera driver for the AI Thinker ESP32-CAM (OV2640).

use super::FrameSource;
use esp_idf_sys::{self as sys, camera, esp};
use log::info;
use std::fmt;
use std::ptr::NonNull;

// AI Thinker ESP32-CAM pin map
const CAM_PIN_PWDN: i32 = 32;
const CAM_PIN_RESET: i32 = -1;
const CAM_PIN_XCLK: i32 = 0;
const CAM_PIN_SIOD: i32 = 26;
const CAM_PIN_SIOC: i32 = 27;
const CAM_PIN_D7: i32 = 35;
const CAM_PIN_D6: i32 = 34;
const CAM_PIN_D5: i32 = 39;
const CAM_PIN_D4: i32 = 36;
const CAM_PIN_D3: i32 = 21;
const CAM_PIN_D2: i32 = 19;
const CAM_PIN_D1: i32 = 18;
const CAM_PIN_D0: i32 = 5;
const CAM_PIN_VSYNC: i32 = 25;
const CAM_PIN_HREF: i32 = 23;
const CAM_PIN_PCLK: i32 = 22;

const XCLK_FREQ_HZ: i32 = 20_000_000;

/// Frame buffer borrowed from the driver pool.
pub struct FrameBuffer(NonNull<camera::camera_fb_t>);

impl AsRef<[u8]> for FrameBuffer {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: the driver keeps `buf` valid for `len` bytes until the
        // buffer is returned, and returning consumes this handle.
        unsafe {
            let fb = self.0.as_ref();
            std::slice::from_raw_parts(fb.buf, fb.len)
        }
    }
}

/// Initialized esp32-camera sensor.
pub struct EspCamera {
    _private: (),
}

impl EspCamera {
    /// Initialize the sensor for JPEG capture.
    ///
    /// With PSRAM: VGA, two buffers, grab when empty. Without: QVGA, one
    /// buffer, grab latest.
    pub fn init() -> Result<Self, CameraError> {
        let has_psram = unsafe { sys::heap_caps_get_total_size(sys::MALLOC_CAP_SPIRAM) } > 0;

        let (frame_size, jpeg_quality, fb_count, grab_mode) = if has_psram {
            (
                camera::framesize_t_FRAMESIZE_VGA,
                10,
                2,
                camera::camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,
            )
        } else {
            (
                camera::framesize_t_FRAMESIZE_QVGA,
                12,
                1,
                camera::camera_grab_mode_t_CAMERA_GRAB_LATEST,
            )
        };

        let config = camera::camera_config_t {
            pin_pwdn: CAM_PIN_PWDN,
            pin_reset: CAM_PIN_RESET,
            pin_xclk: CAM_PIN_XCLK,
            __bindgen_anon_1: camera::camera_config_t__bindgen_ty_1 {
                pin_sccb_sda: CAM_PIN_SIOD,
            },
            __bindgen_anon_2: camera::camera_config_t__bindgen_ty_2 {
                pin_sccb_scl: CAM_PIN_SIOC,
            },
            pin_d7: CAM_PIN_D7,
            pin_d6: CAM_PIN_D6,
            pin_d5: CAM_PIN_D5,
            pin_d4: CAM_PIN_D4,
            pin_d3: CAM_PIN_D3,
            pin_d2: CAM_PIN_D2,
            pin_d1: CAM_PIN_D1,
            pin_d0: CAM_PIN_D0,
            pin_vsync: CAM_PIN_VSYNC,
            pin_href: CAM_PIN_HREF,
            pin_pclk: CAM_PIN_PCLK,
            xclk_freq_hz: XCLK_FREQ_HZ,
            ledc_timer: sys::ledc_timer_t_LEDC_TIMER_0,
            ledc_channel: sys::ledc_channel_t_LEDC_CHANNEL_0,
            pixel_format: camera::pixformat_t_PIXFORMAT_JPEG,
            frame_size,
            jpeg_quality,
            fb_count,
            grab_mode,
            ..Default::default()
        };

        esp!(unsafe { camera::esp_camera_init(&config) }).map_err(CameraError::Init)?;
        info!(
            "Camera initialized ({} buffer(s), PSRAM {})",
            fb_count,
            if has_psram { "found" } else { "absent" }
        );
        Ok(Self { _private: () })
    }
}

impl FrameSource for EspCamera {
    type Buffer = FrameBuffer;

    fn acquire(&mut self) -> Option<FrameBuffer> {
        NonNull::new(unsafe { camera::esp_camera_fb_get() }).map(FrameBuffer)
    }

    fn release(&mut self, buffer: FrameBuffer) {
        unsafe { camera::esp_camera_fb_return(buffer.0.as_ptr()) };
    }
}

/// Camera driver errors.
#[derive(Debug)]
pub enum CameraError {
    /// Driver initialization failed.
    Init(sys::EspError),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(e) => write!(f, "camera init failed: {:?}", e),
        }
    }
}

impl std::error::Error for CameraError {}
