//! ESP-IDF WiFi radio.
//!
//! Wraps the ESP-IDF WiFi driver for station association, access point
//! start-up and scanning.

use super::{RadioError, ScanEntry, WifiRadio};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi,
};
use esp_idf_sys::EspError;
use log::{debug, info};
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

/// Polls of the AP interface after the driver starts.
const AP_UP_ATTEMPTS: u32 = 50;

/// Wait between AP interface polls.
const AP_UP_POLL: Duration = Duration::from_millis(100);

/// ESP-IDF backed [`WifiRadio`].
pub struct EspRadio {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl EspRadio {
    /// Create the radio driver.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, EspError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self { wifi })
    }

    fn wait_ap_up(&self) -> Result<(), RadioError> {
        for _ in 0..AP_UP_ATTEMPTS {
            if self.wifi.wifi().ap_netif().is_up().map_err(driver)? {
                return Ok(());
            }
            thread::sleep(AP_UP_POLL);
        }
        Err(RadioError::Driver("access point interface did not come up".into()))
    }
}

impl WifiRadio for EspRadio {
    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| RadioError::InvalidSsid)?,
            password: password.try_into().map_err(|_| RadioError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config).map_err(driver)?;
        self.wifi.start().map_err(driver)?;
        // Non-blocking connect; the mode controller polls for completion
        self.wifi.wifi_mut().connect().map_err(driver)?;
        Ok(())
    }

    fn is_station_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }

    fn teardown_station(&mut self) -> Result<(), RadioError> {
        info!("Disconnecting from WiFi");
        if let Err(e) = self.wifi.disconnect() {
            debug!("Disconnect before stop failed: {:?}", e);
        }
        self.wifi.stop().map_err(driver)?;
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<Ipv4Addr, RadioError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        // Mixed mode keeps the station side available for scans
        let config = Configuration::Mixed(
            ClientConfiguration::default(),
            AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|_| RadioError::InvalidSsid)?,
                password: password.try_into().map_err(|_| RadioError::InvalidPassword)?,
                auth_method,
                channel: 1,
                ..Default::default()
            },
        );

        self.wifi.set_configuration(&config).map_err(driver)?;
        self.wifi.start().map_err(driver)?;
        // The station side of Mixed mode is never associated, so only the AP
        // interface is waited on
        self.wait_ap_up()?;

        let ip_info = self.wifi.wifi().ap_netif().get_ip_info().map_err(driver)?;
        Ok(ip_info.ip)
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, RadioError> {
        let found = self
            .wifi
            .scan()
            .map_err(|e| RadioError::ScanFailed(format!("{:?}", e)))?;
        Ok(found
            .into_iter()
            .map(|ap| ScanEntry {
                ssid: ap.ssid.as_str().to_string(),
                rssi: ap.signal_strength,
                open: matches!(ap.auth_method, None | Some(AuthMethod::None)),
            })
            .collect())
    }
}

fn driver(e: EspError) -> RadioError {
    RadioError::Driver(format!("{:?}", e))
}
