use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::web_server::ServerLimits;
use crate::{Error, Result};

/// 顶层应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ap: ApConfig,
    pub server: ServerConfig,
    pub display: DisplayConfig,
    pub wifi: WifiConfig,
    pub frontend: FrontendConfig,
}

/// 用于解析 TOML 的临时结构；每个表都可以省略
#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct AppConfigFile {
    ap: ApConfigToml,
    server: ServerConfigToml,
    display: DisplayConfigToml,
    wifi: WifiConfigToml,
    frontend: FrontendConfigToml,
}

// ============= AP 配置 =============

/// Access point the device hosts at startup.
#[derive(Debug, Clone)]
pub struct ApConfig {
    pub ssid: String,
    /// WPA2 passphrase; empty for an open AP.
    pub psk: String,
    /// Address the device takes on its own AP.
    pub address: IpAddr,
    pub gateway_cidr: String,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ApConfigToml {
    ap_ssid: String,
    ap_psk: String,
    ap_address: String,
    ap_gateway_cidr: String,
}

impl Default for ApConfigToml {
    fn default() -> Self {
        Self {
            ap_ssid: "ESP32-S3_AP".to_string(),
            ap_psk: "12345678".to_string(),
            ap_address: "192.168.4.1".to_string(),
            ap_gateway_cidr: "192.168.4.1/24".to_string(),
        }
    }
}

impl TryFrom<ApConfigToml> for ApConfig {
    type Error = Error;

    fn try_from(t: ApConfigToml) -> Result<Self> {
        if t.ap_ssid.is_empty() || t.ap_ssid.len() > 32 {
            return Err(Error::Config(format!(
                "ap_ssid must be 1-32 bytes, got {}",
                t.ap_ssid.len()
            )));
        }
        // WPA2-PSK 口令长度必须在 8 到 63 之间
        if !t.ap_psk.is_empty() && !(8..=63).contains(&t.ap_psk.len()) {
            return Err(Error::Config("ap_psk must be empty or 8-63 characters".into()));
        }
        let address = IpAddr::from_str(&t.ap_address)
            .map_err(|e| Error::Config(format!("Invalid ap_address '{}': {}", t.ap_address, e)))?;
        Ok(ApConfig {
            ssid: t.ap_ssid,
            psk: t.ap_psk,
            address,
            gateway_cidr: t.ap_gateway_cidr,
        })
    }
}

// ============= HTTP 服务器配置 =============

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Upper bound for one request, head and body together.
    pub max_request_bytes: usize,
    /// Deadline for the whole request to arrive.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl ServerConfig {
    pub fn limits(&self) -> ServerLimits {
        ServerLimits {
            max_request_bytes: self.max_request_bytes,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerConfigToml {
    bind_addr: String,
    max_request_bytes: usize,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
}

impl Default for ServerConfigToml {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:80".to_string(),
            max_request_bytes: 4096,
            read_timeout_ms: 3000,
            write_timeout_ms: 3000,
        }
    }
}

impl TryFrom<ServerConfigToml> for ServerConfig {
    type Error = Error;

    fn try_from(t: ServerConfigToml) -> Result<Self> {
        let bind_addr = SocketAddr::from_str(&t.bind_addr)
            .map_err(|e| Error::Config(format!("Invalid bind_addr '{}': {}", t.bind_addr, e)))?;
        if !(256..=65536).contains(&t.max_request_bytes) {
            return Err(Error::Config(format!(
                "max_request_bytes must be within 256..=65536, got {}",
                t.max_request_bytes
            )));
        }
        if t.read_timeout_ms == 0 || t.write_timeout_ms == 0 {
            return Err(Error::Config("server timeouts must be non-zero".into()));
        }
        Ok(ServerConfig {
            bind_addr,
            max_request_bytes: t.max_request_bytes,
            read_timeout: Duration::from_millis(t.read_timeout_ms),
            write_timeout: Duration::from_millis(t.write_timeout_ms),
        })
    }
}

// ============= 显示屏配置 =============

/// Text geometry of the display.
///
/// The defaults describe a 128x64 panel with an 8 px font on a 10 px line
/// pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub chars_per_line: usize,
    pub max_lines: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            chars_per_line: 16,
            max_lines: 6,
        }
    }
}

type DisplayConfigToml = DisplayConfig;

impl DisplayConfig {
    fn validate(self) -> Result<Self> {
        if self.chars_per_line == 0 || self.max_lines == 0 {
            return Err(Error::Config("display geometry must be non-zero".into()));
        }
        Ok(self)
    }
}

// ============= Wi-Fi (STA) 配置 =============

#[derive(Debug, Clone)]
pub struct WifiConfig {
    pub interface_name: String,
    /// Longest time `/connect` may block the loop.
    pub join_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WifiConfigToml {
    interface_name: String,
    join_timeout_secs: u64,
    poll_interval_ms: u64,
}

impl Default for WifiConfigToml {
    fn default() -> Self {
        Self {
            interface_name: "wlan0".to_string(),
            join_timeout_secs: 10,
            poll_interval_ms: 500,
        }
    }
}

impl TryFrom<WifiConfigToml> for WifiConfig {
    type Error = Error;

    fn try_from(t: WifiConfigToml) -> Result<Self> {
        if t.join_timeout_secs == 0 || t.poll_interval_ms == 0 {
            return Err(Error::Config(
                "join_timeout_secs and poll_interval_ms must be non-zero".into(),
            ));
        }
        Ok(WifiConfig {
            interface_name: t.interface_name,
            join_timeout: Duration::from_secs(t.join_timeout_secs),
            poll_interval: Duration::from_millis(t.poll_interval_ms),
        })
    }
}

// ============= 前端配置 =============

/// 磁盘前端的根目录（仅在 `frontend_disk` 特性开启时使用）
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrontendConfig {
    pub disk_root: PathBuf,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            disk_root: PathBuf::from("apboard-core/ui"),
        }
    }
}

type FrontendConfigToml = FrontendConfig;

// ============= 配置加载函数 =============

impl Default for AppConfig {
    fn default() -> Self {
        // 内置默认值总是合法的
        Self {
            ap: ApConfig {
                ssid: "ESP32-S3_AP".to_string(),
                psk: "12345678".to_string(),
                address: IpAddr::from([192, 168, 4, 1]),
                gateway_cidr: "192.168.4.1/24".to_string(),
            },
            server: ServerConfig {
                bind_addr: SocketAddr::from(([0, 0, 0, 0], 80)),
                max_request_bytes: 4096,
                read_timeout: Duration::from_millis(3000),
                write_timeout: Duration::from_millis(3000),
            },
            display: DisplayConfig::default(),
            wifi: WifiConfig {
                interface_name: "wlan0".to_string(),
                join_timeout: Duration::from_secs(10),
                poll_interval: Duration::from_millis(500),
            },
            frontend: FrontendConfig::default(),
        }
    }
}

/// 从 TOML 字符串加载应用配置
pub fn load_config_from_toml_str(s: &str) -> Result<AppConfig> {
    let parsed: AppConfigFile = toml::from_str(s)?;

    Ok(AppConfig {
        ap: ApConfig::try_from(parsed.ap)?,
        server: ServerConfig::try_from(parsed.server)?,
        display: parsed.display.validate()?,
        wifi: WifiConfig::try_from(parsed.wifi)?,
        frontend: parsed.frontend,
    })
}

/// 从磁盘上的 TOML 文件加载应用配置
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let text = std::fs::read_to_string(path)?;
    load_config_from_toml_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED_CONFIG: &str = include_str!("../../configs/apboard.toml");

    #[test]
    fn empty_document_yields_defaults() {
        let config = load_config_from_toml_str("").unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.ap.ssid, defaults.ap.ssid);
        assert_eq!(config.ap.psk, defaults.ap.psk);
        assert_eq!(config.ap.address, defaults.ap.address);
        assert_eq!(config.server.bind_addr, defaults.server.bind_addr);
        assert_eq!(config.server.max_request_bytes, 4096);
        assert_eq!(config.display, DisplayConfig { chars_per_line: 16, max_lines: 6 });
        assert_eq!(config.wifi.join_timeout, Duration::from_secs(10));
        assert_eq!(config.wifi.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn shipped_config_parses() {
        let config = load_config_from_toml_str(SHIPPED_CONFIG).unwrap();
        assert_eq!(config.ap.ssid, "ESP32-S3_AP");
        assert_eq!(config.wifi.interface_name, "wlan0");
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = load_config_from_toml_str(
            r#"
            [display]
            chars_per_line = 21

            [server]
            bind_addr = "127.0.0.1:8080"
            "#,
        )
        .unwrap();
        assert_eq!(config.display.chars_per_line, 21);
        assert_eq!(config.display.max_lines, 6);
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server.read_timeout, Duration::from_millis(3000));
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_addr = "[server]\nbind_addr = \"not-an-address\"";
        assert!(matches!(load_config_from_toml_str(bad_addr), Err(Error::Config(_))));

        let short_psk = "[ap]\nap_psk = \"short\"";
        assert!(matches!(load_config_from_toml_str(short_psk), Err(Error::Config(_))));

        let zero_lines = "[display]\nmax_lines = 0";
        assert!(matches!(load_config_from_toml_str(zero_lines), Err(Error::Config(_))));

        let tiny_buffer = "[server]\nmax_request_bytes = 16";
        assert!(matches!(load_config_from_toml_str(tiny_buffer), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_unknown_keys() {
        let typo = "[wifi]\njoin_timeout = 5";
        assert!(matches!(load_config_from_toml_str(typo), Err(Error::Toml(_))));
    }
}
