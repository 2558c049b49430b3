use crate::backends::utils::poll_until;
use crate::config::{ApConfig, DisplayConfig};
use crate::traits::{
    ClimateReading, ClimateSensor, ConnectOutcome, NetworkInfo, SensorError, StatusLight, TextDisplay,
    WifiRadio,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::Mutex;

/// One raw entry as a radio reports it, before security classification.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub ssid: String,
    pub rssi: i16,
    pub auth_code: u8,
}

impl ScanRecord {
    pub fn new(ssid: &str, rssi: i16, auth_code: u8) -> Self {
        Self {
            ssid: ssid.to_string(),
            rssi,
            auth_code,
        }
    }
}

impl From<&ScanRecord> for NetworkInfo {
    fn from(r: &ScanRecord) -> Self {
        NetworkInfo {
            ssid: r.ssid.clone(),
            rssi: r.rssi,
            security: crate::traits::Security::from_auth_code(r.auth_code),
        }
    }
}

/// How the simulated radio answers join requests.
#[derive(Debug, Clone)]
pub enum JoinPlan {
    /// Join succeeds when the SSID is in range and the password is plausible
    /// for its security class: empty for open networks, 8+ characters
    /// otherwise. The address appears after `polls` checks.
    InRange { polls: u32 },
    /// Every join ends with this outcome.
    Always(ConnectOutcome),
}

#[derive(Debug)]
struct MockState {
    pixel: (u8, u8, u8),
    lines: Vec<String>,
    history: Vec<Vec<String>>,
    climate: std::result::Result<ClimateReading, SensorError>,
    access_point: Option<IpAddr>,
    joined: Option<String>,
}

/// A simulated board: RGB LED, text display, climate sensor and radio.
///
/// It simulates every peripheral without any real hardware interaction,
/// and enforces the display geometry the way a real driver would.
#[derive(Debug)]
pub struct MockBoard {
    geometry: DisplayConfig,
    scan_records: Vec<ScanRecord>,
    poll_interval: Duration,
    join_plan: JoinPlan,
    state: Mutex<MockState>,
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            geometry: DisplayConfig::default(),
            scan_records: default_scan_records(),
            poll_interval: Duration::from_millis(100),
            join_plan: JoinPlan::InRange { polls: 2 },
            state: Mutex::new(MockState {
                pixel: (0, 0, 0),
                lines: Vec::new(),
                history: Vec::new(),
                climate: Ok(ClimateReading {
                    temperature: 22.5,
                    humidity: 45.0,
                }),
                access_point: None,
                joined: None,
            }),
        }
    }

    pub fn with_geometry(mut self, geometry: DisplayConfig) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_scan_records(mut self, records: Vec<ScanRecord>) -> Self {
        self.scan_records = records;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_join_plan(mut self, plan: JoinPlan) -> Self {
        self.join_plan = plan;
        self
    }

    pub async fn pixel(&self) -> (u8, u8, u8) {
        self.state.lock().await.pixel
    }

    pub async fn display_lines(&self) -> Vec<String> {
        self.state.lock().await.lines.clone()
    }

    /// Every accepted `show_text` call, oldest first.
    pub async fn display_history(&self) -> Vec<Vec<String>> {
        self.state.lock().await.history.clone()
    }

    pub async fn access_point(&self) -> Option<IpAddr> {
        self.state.lock().await.access_point
    }

    pub async fn joined_ssid(&self) -> Option<String> {
        self.state.lock().await.joined.clone()
    }

    /// Makes every following read return `reading`.
    pub async fn set_climate(&self, reading: std::result::Result<ClimateReading, SensorError>) {
        self.state.lock().await.climate = reading;
    }

    fn join_allowed(&self, ssid: &str, password: &str) -> Option<usize> {
        let index = self.scan_records.iter().position(|r| r.ssid == ssid)?;
        let open = self.scan_records[index].auth_code == 0;
        let plausible = if open { password.is_empty() } else { password.len() >= 8 };
        plausible.then_some(index)
    }
}

fn default_scan_records() -> Vec<ScanRecord> {
    vec![
        ScanRecord::new("MyHomeWiFi", -42, 3),
        ScanRecord::new("CafeGuest", -67, 0),
        ScanRecord::new("Neighbor's Network", -78, 2),
        ScanRecord::new("Office-SAE", -55, 6),
        ScanRecord::new("HiddenNetwork", -88, 4),
    ]
}

#[async_trait]
impl StatusLight for MockBoard {
    async fn set_pixel(&self, red: u8, green: u8, blue: u8) -> Result<()> {
        tracing::info!("🤖 [MockBoard] LED -> ({}, {}, {})", red, green, blue);
        self.state.lock().await.pixel = (red, green, blue);
        Ok(())
    }
}

#[async_trait]
impl TextDisplay for MockBoard {
    async fn show_text(&self, lines: &[String]) -> Result<()> {
        if lines.len() > self.geometry.max_lines {
            return Err(Error::Display(format!(
                "{} lines do not fit a {}-line display",
                lines.len(),
                self.geometry.max_lines
            )));
        }
        if let Some(long) = lines.iter().find(|l| l.chars().count() > self.geometry.chars_per_line) {
            return Err(Error::Display(format!("line too long: {:?}", long)));
        }
        tracing::info!("🤖 [MockBoard] Display -> {:?}", lines);
        let mut state = self.state.lock().await;
        state.lines = lines.to_vec();
        state.history.push(lines.to_vec());
        Ok(())
    }
}

#[async_trait]
impl ClimateSensor for MockBoard {
    async fn read_climate(&self) -> std::result::Result<ClimateReading, SensorError> {
        self.state.lock().await.climate.clone()
    }
}

#[async_trait]
impl WifiRadio for MockBoard {
    async fn start_access_point(&self, ap: &ApConfig) -> Result<IpAddr> {
        tracing::info!("🤖 [MockBoard] Starting AP '{}' (simulated).", ap.ssid);
        self.state.lock().await.access_point = Some(ap.address);
        Ok(ap.address)
    }

    async fn scan_networks(&self) -> Result<Vec<NetworkInfo>> {
        tracing::info!("🤖 [MockBoard] Scanning for networks...");
        let networks: Vec<NetworkInfo> = self.scan_records.iter().map(NetworkInfo::from).collect();
        tracing::info!("🤖 [MockBoard] Found {} networks.", networks.len());
        Ok(networks)
    }

    async fn join_network(&self, ssid: &str, password: &str, timeout: Duration) -> ConnectOutcome {
        tracing::info!(
            "🤖 [MockBoard] Attempting to join SSID: '{}' with password: '{}'",
            ssid,
            if password.is_empty() { "(empty)" } else { "********" }
        );
        let outcome = match self.join_plan.clone() {
            JoinPlan::Always(outcome) => outcome,
            JoinPlan::InRange { polls } => match self.join_allowed(ssid, password) {
                None => ConnectOutcome::Failed,
                Some(index) => {
                    let ip = format!("192.168.1.{}", 100 + index);
                    let mut remaining = polls;
                    let joined = poll_until(timeout, self.poll_interval, || {
                        let ready = remaining == 0;
                        remaining = remaining.saturating_sub(1);
                        let ip = ip.clone();
                        async move { ready.then_some(ip) }
                    })
                    .await;
                    match joined {
                        Some(ip) => ConnectOutcome::Connected(ip),
                        None => {
                            let err = Error::JoinTimeout {
                                ssid: ssid.to_string(),
                                secs: timeout.as_secs(),
                            };
                            tracing::warn!("🤖 [MockBoard] {}", err);
                            ConnectOutcome::Failed
                        }
                    }
                }
            },
        };

        if let ConnectOutcome::Connected(_) = &outcome {
            self.state.lock().await.joined = Some(ssid.to_string());
        }
        tracing::info!("🤖 [MockBoard] Join '{}' -> {:?}", ssid, outcome);
        outcome
    }
}
