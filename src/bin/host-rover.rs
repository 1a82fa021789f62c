//! Host-based rover for development and testing.
//!
//! Runs the full controller and HTTP API on the host with simulated
//! hardware. Configuration persists in a file, and a restart request
//! re-runs the boot sequence in-process.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-rover
//! ROVER_SIM_WIFI=reachable ROVER_HTTP_PORT=9000 cargo run --bin host-rover
//! ```
//!
//! Environment:
//! - `ROVER_HTTP_PORT` - listen port (default 8080)
//! - `ROVER_STORE_PATH` - configuration file (default `~/.rover-cam-esp32/config.bin`)
//! - `ROVER_SIM_WIFI` - `reachable` or `unreachable` station network (default `unreachable`)
//! - `RUST_LOG` - log filter (default `info`)

use log::{error, info, warn};
use rover_cam_esp32::config::{default_store_path, RECORD_LEN};
use rover_cam_esp32::network::Delay;
use rover_cam_esp32::{
    FileStore, HttpServer, RecordingPwm, Rover, SimulatedCamera, SimulatedRadio, ThreadDelay,
    BOOT_FAILURE_RESTART_DELAY,
};
use std::path::PathBuf;

/// Port used when `ROVER_HTTP_PORT` is unset.
const HOST_HTTP_PORT: u16 = 8080;

/// Polls before the simulated station network accepts.
const SIM_CONNECT_POLLS: u32 = 3;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== RoverCam host rover starting ===");

    let port = match std::env::var("ROVER_HTTP_PORT") {
        Ok(value) => match value.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                error!("ROVER_HTTP_PORT is not a port number: {}", value);
                std::process::exit(1);
            }
        },
        Err(_) => HOST_HTTP_PORT,
    };

    let store_path = match std::env::var("ROVER_STORE_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => match default_store_path() {
            Ok(path) => path,
            Err(e) => {
                error!("Cannot determine store path: {}", e);
                std::process::exit(1);
            }
        },
    };

    let reachable = match std::env::var("ROVER_SIM_WIFI").as_deref() {
        Ok("reachable") => true,
        Ok("unreachable") | Err(_) => false,
        Ok(other) => {
            warn!("Unknown ROVER_SIM_WIFI value {:?}, using unreachable", other);
            false
        }
    };

    let server = match HttpServer::bind(port) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start HTTP server: {}", e);
            std::process::exit(1);
        }
    };
    info!("Rover API at http://localhost:{}/", port);

    let mut delay = ThreadDelay;
    let mut boots = 0u32;
    loop {
        boots += 1;
        info!("Boot #{}", boots);

        let store = match FileStore::open(&store_path, RECORD_LEN) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to open {:?}: {}", store_path, e);
                std::process::exit(1);
            }
        };
        let radio = if reachable {
            SimulatedRadio::reachable_after(SIM_CONNECT_POLLS)
        } else {
            SimulatedRadio::unreachable()
        };

        let mut rover = match Rover::boot(
            store,
            RecordingPwm::new(),
            SimulatedCamera::default(),
            radio,
            &mut delay,
        ) {
            Ok(rover) => rover,
            Err(e) => {
                error!("Boot failed: {}", e);
                delay.delay(BOOT_FAILURE_RESTART_DELAY);
                continue;
            }
        };

        match server.serve(&mut rover, &mut delay) {
            Ok(_) => info!("Restarting..."),
            Err(e) => {
                error!("HTTP server stopped: {}", e);
                std::process::exit(1);
            }
        }
    }
}
