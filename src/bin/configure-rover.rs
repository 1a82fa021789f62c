//! Station credential provisioning for the rover.
//!
//! Writes WiFi credentials baked in at compile time into the persisted
//! configuration, keeping the stored access point and motor pins.
//!
//! Usage:
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo run --release --features esp32 --bin configure-rover
//!
//! For open networks (no password):
//!   WIFI_SSID="OpenNetwork" WIFI_PASSWORD="" cargo run --release --features esp32 --bin configure-rover

/// WiFi SSID - set via WIFI_SSID environment variable at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// WiFi password - set via WIFI_PASSWORD environment variable at compile time.
/// Empty string for open networks.
#[cfg(feature = "esp32")]
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

/// Print error message and exit after the serial output has drained.
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use rover_cam_esp32::config::{init_nvs, ConfigStore, NvsStore, RECORD_LEN};

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== Rover WiFi Configuration ===\n");

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => {
            halt_with_error(
                "Error: WIFI_SSID environment variable not set at compile time.\n\n\
                 Usage:\n  \
                 WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo run --release --features esp32 --bin configure-rover",
            );
        }
    };
    let password = WIFI_PASSWORD.unwrap_or("");

    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() { "(none)" } else { "****" },
        password.len()
    );

    let nvs = init_nvs().unwrap_or_else(|e| halt_with_error(&format!("NVS init failed: {:?}", e)));
    let region = NvsStore::open(nvs, RECORD_LEN)
        .unwrap_or_else(|e| halt_with_error(&format!("NVS open failed: {:?}", e)));
    let mut store = ConfigStore::new(region);

    let mut record = store.load();
    if let Err(e) = record.set_station(ssid, password) {
        halt_with_error(&format!("Error: {}", e));
    }
    if let Err(e) = store.save(&mut record) {
        halt_with_error(&format!("Error saving configuration: {}", e));
    }

    println!("\n=== Station credentials saved ===");
    println!("Access point: {}", record.ap_ssid);
    println!("Motor pins: {}", record.motor_pins);
    println!("\n=== Done - reset the rover to connect ===\n");

    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo run --release --features esp32 --bin configure-rover");
    std::process::exit(1);
}
