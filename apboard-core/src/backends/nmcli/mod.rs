use crate::backends::utils::{poll_until, rssi_from_signal_percent};
use crate::config::ApConfig;
use crate::traits::{ConnectOutcome, NetworkInfo, Security, WifiRadio};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;

// 通过调用 nmcli 命令行工具实现的无线电后端，适用于使用 NetworkManager 管理网络连接的 Linux 系统

#[derive(Debug)]
pub struct NmcliRadio {
    interface: String,
    poll_interval: Duration,
    /// 当前由我们创建的热点（用于加入失败后恢复）
    hotspot: Mutex<Option<ApConfig>>,
}

impl NmcliRadio {
    pub fn new(interface: &str, poll_interval: Duration) -> Self {
        Self {
            interface: interface.to_string(),
            poll_interval,
            hotspot: Mutex::new(None),
        }
    }

    /// 启动 AP（使用 `connection add` 以便指定 IP）
    async fn bring_up_hotspot(&self, ap: &ApConfig) -> Result<()> {
        let mut add = Command::new("nmcli");
        add.args(["connection", "add", "type", "wifi"])
            .args(["ifname", &self.interface])
            .args(["con-name", &ap.ssid])
            .args(["autoconnect", "no"])
            .args(["ssid", &ap.ssid])
            .args(["802-11-wireless.mode", "ap"])
            .args(["ipv4.method", "shared"])
            .args(["ipv4.addresses", &ap.gateway_cidr]);
        if !ap.psk.is_empty() {
            add.args(["wifi-sec.key-mgmt", "wpa-psk"])
                .args(["wifi-sec.psk", &ap.psk]);
        }
        let add_output = add.output().await?;

        if !add_output.status.success() {
            let err = String::from_utf8_lossy(&add_output.stderr);
            if !err.contains("already exists") {
                return Err(Error::CommandFailed(format!(
                    "Failed to add hotspot connection: {}",
                    err.trim()
                )));
            }
        }

        let up_output = Command::new("nmcli")
            .args(["connection", "up", &ap.ssid])
            .output()
            .await?;

        if !up_output.status.success() {
            let err = String::from_utf8_lossy(&up_output.stderr);
            return Err(Error::CommandFailed(format!(
                "Failed to bring up hotspot connection: {}",
                err.trim()
            )));
        }

        *self.hotspot.lock().await = Some(ap.clone());
        Ok(())
    }

    async fn take_down_hotspot(&self) {
        if let Some(ap) = self.hotspot.lock().await.as_ref() {
            let _ = Command::new("nmcli")
                .args(["connection", "down", &ap.ssid])
                .output()
                .await;
        }
    }

    async fn restore_hotspot(&self) {
        let ap = self.hotspot.lock().await.clone();
        if let Some(ap) = ap {
            if let Err(e) = self.bring_up_hotspot(&ap).await {
                tracing::error!("Failed to restore hotspot '{}': {}", ap.ssid, e);
            }
        }
    }

    /// 如果接口已激活到 `ssid`，返回其 IPv4 地址
    async fn associated_address(&self, ssid: &str) -> Option<String> {
        let active = Command::new("nmcli")
            .args(["-t", "-f", "NAME,DEVICE,STATE", "connection", "show", "--active"])
            .output()
            .await
            .ok()?;
        if !active.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&active.stdout);
        let associated = stdout.lines().map(split_terse).any(|parts| {
            parts.len() >= 3 && parts[0] == ssid && parts[1] == self.interface && parts[2] == "activated"
        });
        if !associated {
            return None;
        }

        let show = Command::new("nmcli")
            .args(["-g", "IP4.ADDRESS", "device", "show", &self.interface])
            .output()
            .await
            .ok()?;
        parse_ip4_address(&String::from_utf8_lossy(&show.stdout))
    }
}

#[async_trait]
impl WifiRadio for NmcliRadio {
    async fn start_access_point(&self, ap: &ApConfig) -> Result<IpAddr> {
        tracing::info!("📡 Bringing up hotspot '{}' on {}", ap.ssid, self.interface);
        self.bring_up_hotspot(ap).await?;
        Ok(ap.address)
    }

    async fn scan_networks(&self) -> Result<Vec<NetworkInfo>> {
        let _ = Command::new("nmcli")
            .args(["device", "wifi", "rescan", "ifname", &self.interface])
            .output()
            .await;
        let output = Command::new("nmcli")
            .args(["-t", "-f", "SSID,SIGNAL,SECURITY", "device", "wifi", "list"])
            .args(["ifname", &self.interface])
            .output()
            .await?;
        if !output.status.success() {
            let err = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed(format!("nmcli scan failed: {}", err.trim())));
        }
        let networks = parse_wifi_list(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!("nmcli scan found {} networks", networks.len());
        Ok(networks)
    }

    async fn join_network(&self, ssid: &str, password: &str, timeout: Duration) -> ConnectOutcome {
        self.take_down_hotspot().await;

        let mut connect = Command::new("nmcli");
        connect.args(["device", "wifi", "connect", ssid]);
        if !password.is_empty() {
            connect.args(["password", password]);
        }
        connect
            .args(["ifname", &self.interface])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match connect.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn nmcli connect: {}", e);
                self.restore_hotspot().await;
                return ConnectOutcome::Failed;
            }
        };

        match poll_until(timeout, self.poll_interval, || self.associated_address(ssid)).await {
            Some(ip) => {
                // nmcli 通常在激活完成后自行退出；不要无限期等待它
                let _ = tokio::time::timeout(self.poll_interval, child.wait()).await;
                ConnectOutcome::Connected(ip)
            }
            None => {
                let err = Error::JoinTimeout {
                    ssid: ssid.to_string(),
                    secs: timeout.as_secs(),
                };
                tracing::warn!("{}", err);
                let _ = child.start_kill();
                self.restore_hotspot().await;
                ConnectOutcome::Failed
            }
        }
    }
}

/// Splits one line of `nmcli -t` output, honouring `\:` and `\\` escapes.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ':' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

/// 把 nmcli 的 SECURITY 字段映射为无线电上报的 802.11 认证类型编号
fn auth_code_from_nmcli(security: &str) -> u8 {
    let security = security.trim();
    if security.is_empty() || security == "--" {
        0
    } else if security.contains("WPA3") || security.contains("SAE") {
        6
    } else if security.contains("WPA2") {
        3
    } else if security.contains("WPA") {
        2
    } else {
        // WEP 等
        1
    }
}

/// Parses `nmcli -t -f SSID,SIGNAL,SECURITY device wifi list`.
///
/// nmcli lists one line per BSSID; only the strongest entry per SSID is kept,
/// strongest first.
fn parse_wifi_list(output: &str) -> Vec<NetworkInfo> {
    let mut by_ssid: HashMap<String, NetworkInfo> = HashMap::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let parts = split_terse(line);
        let ssid = parts.first().cloned().unwrap_or_default();
        if ssid.is_empty() || ssid == "\\x00" {
            continue;
        }
        let signal = parts.get(1).and_then(|s| s.parse::<u8>().ok()).unwrap_or(0);
        let security = parts.get(2).map(String::as_str).unwrap_or("");
        let info = NetworkInfo {
            ssid: ssid.clone(),
            rssi: rssi_from_signal_percent(signal),
            security: Security::from_auth_code(auth_code_from_nmcli(security)),
        };
        match by_ssid.get(&ssid) {
            Some(existing) if existing.rssi >= info.rssi => {}
            _ => {
                by_ssid.insert(ssid, info);
            }
        }
    }
    let mut networks: Vec<NetworkInfo> = by_ssid.into_values().collect();
    networks.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.ssid.cmp(&b.ssid)));
    networks
}

/// `192.168.1.23/24` -> `192.168.1.23`
fn parse_ip4_address(output: &str) -> Option<String> {
    let first = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let addr = first.split('/').next()?;
    addr.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}
