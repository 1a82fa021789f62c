//! Deterministic radio and delay for tests and host runs.

use super::{Delay, RadioError, ScanEntry, WifiRadio};
use std::net::Ipv4Addr;
use std::time::Duration;

/// How the simulated station network responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationBehaviour {
    /// Association succeeds on the given poll (1-based).
    ConnectAfter(u32),
    /// Association never succeeds.
    Never,
    /// The driver refuses to start association.
    RejectBegin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Begin,
    Teardown,
    AccessPoint,
}

/// Scripted [`WifiRadio`].
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    behaviour: StationBehaviour,
    station: Option<(String, String)>,
    access_point: Option<(String, String)>,
    connected: bool,
    polls: u32,
    events: Vec<Event>,
    fail_access_point: bool,
    scan_results: Vec<ScanEntry>,
    fail_scan: bool,
    scans: usize,
}

impl SimulatedRadio {
    /// Address handed out on the simulated station network.
    pub const STATION_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

    /// Address of the simulated access point.
    pub const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

    /// Radio with the given station behaviour and a few nearby networks.
    pub fn new(behaviour: StationBehaviour) -> Self {
        Self {
            behaviour,
            station: None,
            access_point: None,
            connected: false,
            polls: 0,
            events: Vec::new(),
            fail_access_point: false,
            scan_results: vec![
                ScanEntry {
                    ssid: "Home".into(),
                    rssi: -48,
                    open: false,
                },
                ScanEntry {
                    ssid: "Workshop".into(),
                    rssi: -67,
                    open: false,
                },
                ScanEntry {
                    ssid: "Cafe Guest".into(),
                    rssi: -80,
                    open: true,
                },
            ],
            fail_scan: false,
            scans: 0,
        }
    }

    /// Station network that accepts on poll `polls`.
    pub fn reachable_after(polls: u32) -> Self {
        Self::new(StationBehaviour::ConnectAfter(polls))
    }

    /// Station network that never accepts.
    pub fn unreachable() -> Self {
        Self::new(StationBehaviour::Never)
    }

    /// Make `start_access_point` fail.
    pub fn fail_access_point(&mut self, fail: bool) {
        self.fail_access_point = fail;
    }

    /// Replace the networks returned by `scan`.
    pub fn set_scan_results(&mut self, results: Vec<ScanEntry>) {
        self.scan_results = results;
    }

    /// Make `scan` fail.
    pub fn fail_scan(&mut self, fail: bool) {
        self.fail_scan = fail;
    }

    /// Number of `begin_station` calls.
    pub fn begin_calls(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Begin).count()
    }

    /// Number of `is_station_connected` polls.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Number of `teardown_station` calls.
    pub fn teardowns(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Teardown).count()
    }

    /// Number of scans run.
    pub fn scans(&self) -> usize {
        self.scans
    }

    /// Credentials of the last station attempt.
    pub fn station(&self) -> Option<(&str, &str)> {
        self.station
            .as_ref()
            .map(|(ssid, password)| (ssid.as_str(), password.as_str()))
    }

    /// Identity of the running access point.
    pub fn access_point(&self) -> Option<(&str, &str)> {
        self.access_point
            .as_ref()
            .map(|(ssid, password)| (ssid.as_str(), password.as_str()))
    }

    /// True if a teardown preceded the access point start.
    pub fn torn_down_before_ap(&self) -> bool {
        let teardown = self.events.iter().position(|e| *e == Event::Teardown);
        let ap = self.events.iter().position(|e| *e == Event::AccessPoint);
        matches!((teardown, ap), (Some(t), Some(a)) if t < a)
    }
}

impl WifiRadio for SimulatedRadio {
    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.events.push(Event::Begin);
        if self.behaviour == StationBehaviour::RejectBegin {
            return Err(RadioError::Driver("station start refused".into()));
        }
        self.station = Some((ssid.to_string(), password.to_string()));
        self.polls = 0;
        self.connected = false;
        Ok(())
    }

    fn is_station_connected(&mut self) -> bool {
        if self.station.is_none() {
            return false;
        }
        self.polls += 1;
        if let StationBehaviour::ConnectAfter(n) = self.behaviour {
            if self.polls >= n {
                self.connected = true;
            }
        }
        self.connected
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.connected.then_some(Self::STATION_IP)
    }

    fn teardown_station(&mut self) -> Result<(), RadioError> {
        self.events.push(Event::Teardown);
        self.connected = false;
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<Ipv4Addr, RadioError> {
        if self.fail_access_point {
            return Err(RadioError::Driver("access point start refused".into()));
        }
        self.events.push(Event::AccessPoint);
        self.access_point = Some((ssid.to_string(), password.to_string()));
        Ok(Self::AP_IP)
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, RadioError> {
        self.scans += 1;
        if self.fail_scan {
            return Err(RadioError::ScanFailed("radio busy".into()));
        }
        Ok(self.scan_results.clone())
    }
}

/// [`Delay`] that records requested waits instead of sleeping.
#[derive(Debug, Default, Clone)]
pub struct RecordingDelay {
    waits: Vec<Duration>,
}

impl RecordingDelay {
    /// Number of waits requested.
    pub fn calls(&self) -> u32 {
        self.waits.len() as u32
    }

    /// Sum of all waits.
    pub fn total(&self) -> Duration {
        self.waits.iter().sum()
    }
}

impl Delay for RecordingDelay {
    fn delay(&mut self, duration: Duration) {
        self.waits.push(duration);
    }
}
