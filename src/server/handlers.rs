//! Route handlers.

use super::{Outcome, Request, Response};
use crate::camera::FrameSource;
use crate::config::{ByteStore, MotorPins, RecordError};
use crate::motor::{MotorCommand, PwmDriver};
use crate::network::{NetworkMode, WifiRadio};
use crate::rover::Rover;
use log::{error, info, warn};
use serde::Serialize;

const PIN_PARAMS: [&str; 4] = ["IN1", "IN2", "IN3", "IN4"];

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, pre-check=0, post-check=0, max-age=0";

/// `/getconfig` body. Passwords are deliberately absent.
#[derive(Serialize)]
struct ConfigView<'a> {
    ap_ssid: &'a str,
    sta_ssid: &'a str,
    in1_pin: u8,
    in2_pin: u8,
    in3_pin: u8,
    in4_pin: u8,
    ip_address: String,
    wifi_mode: &'static str,
}

impl<S, P, F, R> Rover<S, P, F, R>
where
    S: ByteStore,
    P: PwmDriver,
    F: FrameSource,
    R: WifiRadio,
{
    pub(super) fn handle_drive(&mut self, request: &Request) -> Outcome {
        let left = match parse_speed(request.query_param("left")) {
            Ok(v) => v,
            Err(msg) => return Response::text(400, format!("left {}", msg)).into(),
        };
        let right = match parse_speed(request.query_param("right")) {
            Ok(v) => v,
            Err(msg) => return Response::text(400, format!("right {}", msg)).into(),
        };

        let command = MotorCommand::clamped(left, right);
        info!("Control: Left={}, Right={}", command.left, command.right);

        match self.motors.apply(command) {
            Ok(()) => Response::text(200, "OK").into(),
            Err(e) => {
                error!("Drive failed: {}", e);
                Response::text(500, "Motor error").into()
            }
        }
    }

    pub(super) fn handle_frame(&mut self) -> Outcome {
        let Some(frame) = self.camera.capture() else {
            return Response::text(500, "Camera capture failed").into();
        };

        Response::new(200, "image/jpeg", frame.into_bytes())
            .with_header("Content-Disposition", "inline; filename=capture.jpg")
            .with_header("Cache-Control", NO_CACHE)
            .with_header("Pragma", "no-cache")
            .with_header("Connection", "close")
            .into()
    }

    pub(super) fn handle_config_read(&mut self) -> Outcome {
        let pins = self.config.motor_pins;
        let view = ConfigView {
            ap_ssid: &self.config.ap_ssid,
            sta_ssid: &self.config.station_ssid,
            in1_pin: pins.in1,
            in2_pin: pins.in2,
            in3_pin: pins.in3,
            in4_pin: pins.in4,
            ip_address: self.network.ip.to_string(),
            wifi_mode: self.network.mode.as_str(),
        };

        match serde_json::to_string(&view) {
            Ok(body) => Response::json(body).into(),
            Err(e) => {
                error!("Config serialization failed: {}", e);
                Response::text(500, "Serialization failed").into()
            }
        }
    }

    pub(super) fn handle_pin_update(&mut self, request: &Request) -> Outcome {
        let overrides = PIN_PARAMS.map(|name| request.param(name));
        if overrides.iter().all(Option::is_none) {
            return Response::text(400, "No pin parameters provided.").into();
        }

        let previous = self.config.motor_pins;
        let mut slots = previous.as_array();
        for ((slot, value), name) in slots.iter_mut().zip(overrides).zip(PIN_PARAMS) {
            if let Some(value) = value {
                match value.trim().parse::<u8>() {
                    Ok(pin) => *slot = pin,
                    Err(_) => {
                        return Response::text(400, format!("{} must be a GPIO number.", name))
                            .into()
                    }
                }
            }
        }
        let pins = MotorPins {
            in1: slots[0],
            in2: slots[1],
            in3: slots[2],
            in4: slots[3],
        };
        if let Err(e) = pins.validate() {
            warn!("Rejected pins {}: {}", pins, e);
            return Response::text(400, e.to_string()).into();
        }

        info!("New Pin Config: {}", pins);
        if let Err(e) = self.motors.configure(&pins) {
            error!("PWM reconfigure failed: {}", e);
            self.restore_motors(&previous);
            return Response::text(500, "Motor error").into();
        }

        let mut candidate = self.config.clone();
        candidate.motor_pins = pins;
        if let Err(e) = self.persist(candidate) {
            error!("Failed to save pins: {}", e);
            self.restore_motors(&previous);
            return Response::text(500, "Failed to save configuration.").into();
        }

        Outcome::restart_after(Response::text(200, "Pins updated. Restarting in 3s."))
    }

    pub(super) fn handle_credential_update(&mut self, request: &Request) -> Outcome {
        let mode = request.form_param("mode").unwrap_or("");
        let ssid = request.form_param("ssid");
        let password = request.form_param("password").unwrap_or("");
        info!("Set WiFi: mode={}, ssid={}", mode, ssid.unwrap_or(""));

        let mut candidate = self.config.clone();
        let result = match mode {
            "sta" | "station" => {
                candidate.set_station(ssid.unwrap_or(self.config.station_ssid.as_str()), password)
            }
            "ap" | "access-point" => {
                candidate.set_access_point(ssid.unwrap_or(self.config.ap_ssid.as_str()), password)
            }
            _ => return Response::text(400, "Invalid mode.").into(),
        };
        if let Err(e) = result {
            warn!("Rejected WiFi settings: {}", e);
            let message = match e {
                RecordError::PasswordTooShort { .. } => {
                    "AP password must be at least 8 characters or empty.".to_string()
                }
                other => other.to_string(),
            };
            return Response::text(400, message).into();
        }

        if let Err(e) = self.persist(candidate) {
            error!("Failed to save WiFi settings: {}", e);
            return Response::text(500, "Failed to save configuration.").into();
        }

        Outcome::restart_after(Response::text(
            200,
            "WiFi settings saved. Restarting in 3s to apply.",
        ))
    }

    pub(super) fn handle_scan(&mut self) -> Outcome {
        info!("Scanning WiFi networks...");
        let entries = match self.radio.scan() {
            Ok(entries) => entries,
            Err(e) => {
                error!("Scan failed: {}", e);
                return Response::text(500, "Scan failed").into();
            }
        };

        info!("{} networks found", entries.len());
        for (i, entry) in entries.iter().enumerate() {
            info!(
                "{}: {} ({}){}",
                i + 1,
                entry.ssid,
                entry.rssi,
                if entry.open { " " } else { "*" }
            );
        }

        let names: Vec<&str> = entries.iter().map(|e| e.ssid.as_str()).collect();
        match serde_json::to_string(&names) {
            Ok(body) => Response::json(body).into(),
            Err(e) => {
                error!("Scan serialization failed: {}", e);
                Response::text(500, "Serialization failed").into()
            }
        }
    }

    pub(super) fn handle_status_page(&mut self) -> Outcome {
        Response::html(status_page(self.network.ip.to_string().as_str(), self.network.mode))
            .into()
    }

    fn restore_motors(&mut self, pins: &MotorPins) {
        if let Err(e) = self.motors.configure(pins) {
            error!("Could not restore motor pins {}: {}", pins, e);
        }
    }
}

/// Missing means zero; anything else must be an integer.
fn parse_speed(value: Option<&str>) -> Result<i64, &'static str> {
    match value {
        None | Some("") => Ok(0),
        Some(v) => v.trim().parse::<i64>().map_err(|_| "must be an integer"),
    }
}

fn status_page(ip: &str, mode: NetworkMode) -> String {
    format!(
        "<html><head><title>RoverCam ESP32</title></head><body>\
         <h1>RoverCam ESP32</h1>\
         <p>Status: Online</p>\
         <p>IP: {ip} ({mode})</p>\
         <img src='/stream' width='320' height='240'>\
         <p><a href='/control?left=100&right=100'>Forward</a> | \
         <a href='/control?left=-100&right=-100'>Backward</a> | \
         <a href='/control?left=0&right=0'>Stop</a></p>\
         </body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedCamera;
    use crate::config::{ConfigRecord, MemoryStore, DEFAULT_AP_SSID, DEFAULT_MOTOR_PINS};
    use crate::motor::{Channel, RecordingPwm};
    use crate::network::{RecordingDelay, ScanEntry, SimulatedRadio};

    type SimRover = Rover<MemoryStore, RecordingPwm, SimulatedCamera, SimulatedRadio>;

    fn rover() -> SimRover {
        Rover::boot(
            MemoryStore::default(),
            RecordingPwm::new(),
            SimulatedCamera::default(),
            SimulatedRadio::unreachable(),
            &mut RecordingDelay::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed(None), Ok(0));
        assert_eq!(parse_speed(Some("")), Ok(0));
        assert_eq!(parse_speed(Some("-120")), Ok(-120));
        assert_eq!(parse_speed(Some("9999")), Ok(9999));
        assert!(parse_speed(Some("fast")).is_err());
    }

    #[test]
    fn test_drive_clamps_and_sets_channels() {
        let mut rover = rover();
        let outcome = rover.handle(&Request::get("/control?left=400&right=-80"));
        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.response.body_text(), "OK");

        let pwm = rover.motors().pwm();
        assert_eq!(pwm.duty(Channel::LeftForward), 255);
        assert_eq!(pwm.duty(Channel::LeftBackward), 0);
        assert_eq!(pwm.duty(Channel::RightForward), 0);
        assert_eq!(pwm.duty(Channel::RightBackward), 80);
    }

    #[test]
    fn test_drive_missing_params_stop() {
        let mut rover = rover();
        rover.handle(&Request::get("/control?left=100&right=100"));
        let outcome = rover.handle(&Request::get("/control"));
        assert_eq!(outcome.response.status, 200);
        assert_eq!(rover.motors().pwm().duties(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_drive_rejects_malformed_speed() {
        let mut rover = rover();
        let outcome = rover.handle(&Request::get("/control?left=abc&right=10"));
        assert_eq!(outcome.response.status, 400);
        assert_eq!(rover.motors().pwm().duties(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_frame_headers() {
        let mut rover = rover();
        let resp = rover.handle(&Request::get("/stream")).response;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("Content-Type"), Some("image/jpeg"));
        assert_eq!(
            resp.header("Content-Disposition"),
            Some("inline; filename=capture.jpg")
        );
        assert_eq!(resp.header("Cache-Control"), Some(NO_CACHE));
        assert_eq!(resp.header("Pragma"), Some("no-cache"));
        assert_eq!(resp.header("Connection"), Some("close"));
        assert_eq!(&resp.body[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_config_read_shows_defaults() {
        let mut rover = rover();
        let resp = rover.handle(&Request::get("/getconfig")).response;
        let json: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(json["ap_ssid"], DEFAULT_AP_SSID);
        assert_eq!(json["sta_ssid"], "");
        assert_eq!(json["in1_pin"], DEFAULT_MOTOR_PINS.in1);
        assert_eq!(json["in4_pin"], DEFAULT_MOTOR_PINS.in4);
        assert_eq!(json["ip_address"], "192.168.4.1");
        assert_eq!(json["wifi_mode"], "ap");
        assert!(json.get("ap_password").is_none());
        assert!(json.get("sta_password").is_none());
    }

    #[test]
    fn test_pin_update_merges_partial_overrides() {
        let mut rover = rover();
        let outcome = rover.handle(&Request::post("/setpins", "IN1=2&IN3=16"));
        assert_eq!(outcome.response.status, 200);
        assert!(outcome.restart.is_some());

        let pins = rover.config().motor_pins;
        assert_eq!((pins.in1, pins.in2, pins.in3, pins.in4), (2, 13, 16, 15));
        assert_eq!(rover.motors().pins(), Some(pins));
        assert!(rover.config().saved);
    }

    #[test]
    fn test_pin_update_rejects_bad_values() {
        for body in ["IN1=x", "IN1=300", "IN1=13", "IN2=32", "IN3=34", "IN4=7"] {
            let mut rover = rover();
            let outcome = rover.handle(&Request::post("/setpins", body));
            assert_eq!(outcome.response.status, 400, "{}", body);
            assert!(outcome.restart.is_none());
            assert_eq!(rover.config().motor_pins, DEFAULT_MOTOR_PINS);
            assert_eq!(rover.store().inner().commit_count(), 0);
        }
    }

    #[test]
    fn test_pin_update_persist_failure_restores_bindings() {
        let mut rover = rover();
        rover.store_mut().inner_mut().fail_commits(true);
        let outcome = rover.handle(&Request::post("/setpins", "IN1=2"));
        assert_eq!(outcome.response.status, 500);
        assert!(outcome.restart.is_none());
        assert_eq!(rover.config().motor_pins, DEFAULT_MOTOR_PINS);
        assert_eq!(rover.motors().pins(), Some(DEFAULT_MOTOR_PINS));
        assert_eq!(rover.motors().pwm().pin(Channel::LeftForward), Some(12));
    }

    #[test]
    fn test_credential_update_keeps_stored_ssid_when_absent() {
        let mut rover = rover();
        let outcome = rover.handle(&Request::post("/setwifi", "mode=ap&password=longenough"));
        assert_eq!(outcome.response.status, 200);
        assert_eq!(rover.config().ap_ssid, DEFAULT_AP_SSID);
        assert_eq!(rover.config().ap_password, "longenough");
    }

    #[test]
    fn test_credential_update_rejects_long_ssid() {
        let mut rover = rover();
        let ssid = "x".repeat(33);
        let outcome = rover.handle(&Request::post(
            "/setwifi",
            &format!("mode=sta&ssid={}", ssid),
        ));
        assert_eq!(outcome.response.status, 400);
        assert_eq!(*rover.config(), ConfigRecord::default());
    }

    #[test]
    fn test_credential_update_rejects_nul_ssid() {
        let mut rover = rover();
        let outcome = rover.handle(&Request::post("/setwifi", "mode=ap&ssid=%00Rover"));
        assert_eq!(outcome.response.status, 400);
        assert!(outcome.restart.is_none());
        assert_eq!(*rover.config(), ConfigRecord::default());
        assert_eq!(rover.store().inner().write_count(), 0);
    }

    #[test]
    fn test_credential_update_rejects_nul_password() {
        let mut rover = rover();
        let outcome = rover.handle(&Request::post(
            "/setwifi",
            "mode=ap&password=%00%00%00%00%00%00%00%00",
        ));
        assert_eq!(outcome.response.status, 400);
        assert!(outcome.restart.is_none());
        assert_eq!(rover.config().ap_password, ConfigRecord::default().ap_password);
        assert_eq!(rover.store().inner().write_count(), 0);
    }

    #[test]
    fn test_rejected_credentials_keep_saved_record_loadable() {
        let mut rover = rover();
        let steps = [
            ("/setwifi", "mode=sta&ssid=Home", 200),
            ("/setpins", "IN1=2", 200),
            ("/setwifi", "mode=ap&ssid=%00Rover", 400),
            ("/setwifi", "mode=sta&ssid=Ho%0Ame", 400),
        ];
        for (path, body, status) in steps {
            let outcome = rover.handle(&Request::post(path, body));
            assert_eq!(outcome.response.status, status, "{}", body);
        }

        let expected = rover.config().clone();
        assert_eq!(expected.station_ssid, "Home");
        assert_eq!(expected.motor_pins.in1, 2);
        assert_eq!(rover.store_mut().load(), expected);
    }

    #[test]
    fn test_credential_update_persist_failure() {
        let mut rover = rover();
        rover.store_mut().inner_mut().fail_writes(true);
        let outcome = rover.handle(&Request::post("/setwifi", "mode=sta&ssid=Home"));
        assert_eq!(outcome.response.status, 500);
        assert!(outcome.restart.is_none());
        assert!(!rover.config().has_station());
    }

    #[test]
    fn test_scan_lists_ssids_in_order() {
        let mut rover = rover();
        rover.radio_mut().set_scan_results(vec![
            ScanEntry {
                ssid: "B".into(),
                rssi: -40,
                open: true,
            },
            ScanEntry {
                ssid: "A".into(),
                rssi: -70,
                open: false,
            },
        ]);
        let resp = rover.handle(&Request::get("/scanwifi")).response;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body_text(), r#"["B","A"]"#);
    }

    #[test]
    fn test_scan_failure() {
        let mut rover = rover();
        rover.radio_mut().fail_scan(true);
        let resp = rover.handle(&Request::get("/scanwifi")).response;
        assert_eq!(resp.status, 500);
    }

    #[test]
    fn test_status_page() {
        let mut rover = rover();
        let resp = rover.handle(&Request::get("/")).response;
        let html = resp.body_text();
        assert_eq!(resp.header("Content-Type"), Some("text/html"));
        assert!(html.contains("RoverCam ESP32"));
        assert!(html.contains("192.168.4.1"));
        assert!(html.contains("<img src='/stream' width='320' height='240'>"));
        assert!(html.contains("/control?left=-100&right=-100"));
    }
}
