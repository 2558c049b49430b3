//! Core library for the access-point control panel.
//! This crate defines the peripheral capability traits and data structures,
//! the minimal HTTP listener that serves the panel, and the backend
//! (peripheral) and frontend (UI asset delivery) implementations selected by
//! feature flags.

pub mod backends;
pub mod config;
pub mod display;
pub mod frontends;
pub mod handlers;
pub mod http;
pub mod router;
pub mod traits;
pub mod web_server;

use std::sync::Arc;

use thiserror::Error;

use config::AppConfig;
use display::layout_text;
use handlers::{show_best_effort, PanelContext};
use http::MalformedRequest;
use traits::{PeripheralGateway, SensorError, UiAssetProvider};
use web_server::WebServer;

// Define a shared Error and Result type for the entire crate.

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(#[from] MalformedRequest),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Timed out after {secs}s waiting to join '{ssid}'")]
    JoinTimeout { ssid: String, secs: u64 },

    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;

/// 核心流程：启动 AP、在显示屏上展示地址，然后运行串行的 Web 服务器。
///
/// 只有在监听端口绑定失败或 AP 无法启动时才会返回错误；
/// 单个请求的失败永远不会终止服务循环。
pub async fn run_panel(
    config: AppConfig,
    gateway: Arc<dyn PeripheralGateway>,
    frontend: Arc<dyn UiAssetProvider>,
) -> Result<()> {
    tracing::info!("🚀 Starting access point '{}'...", config.ap.ssid);
    show_best_effort(&*gateway, &["Starting AP...".to_string()]).await;

    let ip = match gateway.start_access_point(&config.ap).await {
        Ok(ip) => ip,
        Err(e) => {
            tracing::error!("❌ Failed to start access point: {}", e);
            return Err(e);
        }
    };
    tracing::info!("📡 AP started. IP: {}", ip);
    show_best_effort(
        &*gateway,
        &layout_text(&format!("AP Mode Active\nIP: {ip}"), &config.display),
    )
    .await;

    let context = PanelContext {
        gateway,
        frontend,
        display: config.display,
        wifi: config.wifi.clone(),
    };
    let server = WebServer::bind(config.server.bind_addr, context, config.server.limits()).await?;
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::board::Board;
    use crate::backends::mock::MockBoard;
    use crate::config::ApConfig;
    use crate::frontends::embed_frontend::EmbedFrontend;
    use crate::traits::{ConnectOutcome, NetworkInfo, WifiRadio};
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::time::Duration;

    struct DeadRadio;

    #[async_trait]
    impl WifiRadio for DeadRadio {
        async fn start_access_point(&self, _ap: &ApConfig) -> Result<IpAddr> {
            Err(Error::CommandFailed("hotspot refused".into()))
        }

        async fn scan_networks(&self) -> Result<Vec<NetworkInfo>> {
            Ok(Vec::new())
        }

        async fn join_network(&self, _ssid: &str, _password: &str, _timeout: Duration) -> ConnectOutcome {
            ConnectOutcome::Failed
        }
    }

    fn local_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.bind_addr = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[tokio::test]
    async fn panel_announces_ap_address_before_serving() {
        let board = Arc::new(MockBoard::new());
        let task = tokio::spawn(run_panel(local_config(), board.clone(), Arc::new(EmbedFrontend::new())));

        for _ in 0..50 {
            if board.display_history().await.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!task.is_finished(), "server should still be running");
        task.abort();

        assert_eq!(board.access_point().await, Some(IpAddr::from([192, 168, 4, 1])));
        assert_eq!(
            board.display_history().await,
            vec![
                vec!["Starting AP...".to_string()],
                vec!["AP Mode Active".to_string(), "IP: 192.168.4.1".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn panel_stops_when_ap_cannot_start() {
        let mock = Arc::new(MockBoard::new());
        let board = Board::new(mock.clone(), mock.clone(), mock.clone(), Arc::new(DeadRadio));

        let result = run_panel(local_config(), Arc::new(board), Arc::new(EmbedFrontend::new())).await;
        assert!(matches!(result, Err(Error::CommandFailed(_))));
        assert_eq!(mock.display_history().await, vec![vec!["Starting AP...".to_string()]]);
        assert_eq!(mock.access_point().await, None);
    }
}
