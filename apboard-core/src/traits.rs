use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::config::ApConfig;

// 在这里定义所有外设后端与前端共享的数据结构和 trait。

/// Security class of a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Security {
    #[serde(rename = "Open")]
    Open,
    #[serde(rename = "WPA/WPA2")]
    WpaFamily,
    #[serde(rename = "WPA3")]
    Wpa3,
}

impl Security {
    /// Maps an 802.11 auth-type code as reported by the radio.
    ///
    /// | code | class |
    /// |------|-------|
    /// | 0 | `Open` |
    /// | 2, 3 | `WpaFamily` |
    /// | other | `Wpa3` |
    pub fn from_auth_code(code: u8) -> Self {
        match code {
            0 => Security::Open,
            2 | 3 => Security::WpaFamily,
            _ => Security::Wpa3,
        }
    }
}

/// Represents a single Wi-Fi network found during a scan.
/// Wi-Fi 扫描时单个网络的具体信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ssid: String,
    pub rssi: i16, // 信号强度 (dBm)，原样透传
    pub security: Security,
}

/// 加入网络的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(String),
    Failed,
}

/// One temperature (°C) / relative humidity (%) sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature: f32,
    pub humidity: f32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor did not respond")]
    Unavailable,

    #[error("sensor returned an invalid frame: {0}")]
    InvalidData(String),
}

// -----------------------------------------------------------------------------
// 外设能力：每个 trait 只覆盖一种硬件，后端可以只实现其中一部分，
// 再由 `backends::board::Board` 组合成完整的网关。

/// RGB 状态灯
#[async_trait]
pub trait StatusLight: Send + Sync {
    async fn set_pixel(&self, red: u8, green: u8, blue: u8) -> crate::Result<()>;
}

/// 小尺寸文字显示屏
#[async_trait]
pub trait TextDisplay: Send + Sync {
    /// Replaces the display contents with `lines`, top to bottom.
    ///
    /// Callers lay the text out with [`crate::display::layout_text`] first;
    /// a driver may reject lines that do not fit its geometry.
    async fn show_text(&self, lines: &[String]) -> crate::Result<()>;
}

/// 温湿度传感器
#[async_trait]
pub trait ClimateSensor: Send + Sync {
    async fn read_climate(&self) -> std::result::Result<ClimateReading, SensorError>;
}

/// Wi-Fi 无线电：AP 模式启动、扫描与 STA 模式加入网络
#[async_trait]
pub trait WifiRadio: Send + Sync {
    /// Brings up the device's own access point and returns its address.
    async fn start_access_point(&self, ap: &ApConfig) -> crate::Result<IpAddr>;

    /// 执行一次实时的 Wi-Fi 扫描
    async fn scan_networks(&self) -> crate::Result<Vec<NetworkInfo>>;

    /// Tries to join `ssid`, waiting at most `timeout` for an address.
    ///
    /// Never blocks longer than `timeout` plus one poll interval. Radio
    /// errors and timeouts are reported as [`ConnectOutcome::Failed`].
    async fn join_network(&self, ssid: &str, password: &str, timeout: Duration) -> ConnectOutcome;
}

/// 处理器可见的全部外设能力。
///
/// 任何同时实现了四种能力的类型都自动实现此 trait。
pub trait PeripheralGateway: StatusLight + TextDisplay + ClimateSensor + WifiRadio {}

impl<T> PeripheralGateway for T where T: StatusLight + TextDisplay + ClimateSensor + WifiRadio {}

/// 前端资源提供者接口。
#[async_trait]
pub trait UiAssetProvider: Send + Sync {
    /// Retrieves a single UI asset.
    ///
    /// # Arguments
    /// * `path` - The path to the asset (e.g., "index.html", "style.css").
    ///
    /// # Returns
    /// A `Result` containing a tuple of (`Cow<'static, [u8]>`, `String`)
    /// representing the asset's content and its MIME type, or an `Error` if not found.
    /// 获取单个 UI 资源。
    async fn get_asset(&self, path: &str) -> crate::Result<(Cow<'static, [u8]>, String)>;
}
