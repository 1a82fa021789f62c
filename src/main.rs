//! RoverCam ESP32 firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    use log::{error, info};
    use rover_cam_esp32::network::Delay;
    use rover_cam_esp32::{ThreadDelay, BOOT_FAILURE_RESTART_DELAY};

    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== RoverCam ESP32 starting ===");

    let mut delay = ThreadDelay;
    match device::run(&mut delay) {
        Ok(restart) => info!("Restart requested after {}s grace", restart.delay.as_secs()),
        Err(e) => {
            error!("{}", e);
            delay.delay(BOOT_FAILURE_RESTART_DELAY);
        }
    }

    info!("Restarting...");
    esp_idf_hal::reset::restart();
}

#[cfg(feature = "esp32")]
mod device {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use log::info;
    use rover_cam_esp32::camera::EspCamera;
    use rover_cam_esp32::config::{init_nvs, NvsStore, RECORD_LEN};
    use rover_cam_esp32::motor::LedcPwm;
    use rover_cam_esp32::network::EspRadio;
    use rover_cam_esp32::server::DEFAULT_HTTP_PORT;
    use rover_cam_esp32::{HttpServer, PendingRestart, Rover, ThreadDelay};

    /// Boot the hardware and serve until a restart is due.
    pub fn run(delay: &mut ThreadDelay) -> Result<PendingRestart, String> {
        let peripherals = Peripherals::take().map_err(|e| format!("Peripherals: {:?}", e))?;
        let sysloop = EspSystemEventLoop::take().map_err(|e| format!("Event loop: {:?}", e))?;

        let nvs = init_nvs().map_err(|e| format!("NVS init failed: {:?}", e))?;
        let store = NvsStore::open(nvs, RECORD_LEN).map_err(|e| format!("NVS open failed: {:?}", e))?;

        let camera = EspCamera::init().map_err(|e| format!("Camera init failed: {}", e))?;
        info!("Camera initialized");

        let radio = EspRadio::new(peripherals.modem, sysloop)
            .map_err(|e| format!("WiFi driver init failed: {:?}", e))?;

        let mut rover = Rover::boot(store, LedcPwm::new(), camera, radio, delay)
            .map_err(|e| format!("Boot failed: {}", e))?;

        let server = HttpServer::bind(DEFAULT_HTTP_PORT)
            .map_err(|e| format!("HTTP server failed: {}", e))?;
        info!(
            "Rover ready at http://{}/ ({})",
            rover.network().ip,
            rover.network().mode
        );

        server
            .serve(&mut rover, delay)
            .map_err(|e| format!("HTTP server stopped: {}", e))
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-rover' to run the rover on the host.");
}
