use apboard_core::config::AppConfig;
use apboard_core::traits::{PeripheralGateway, UiAssetProvider};
use anyhow::Context;
use std::sync::Arc;

/// 运行控制面板，直到其失败或收到 Ctrl-C
pub async fn run_until_shutdown(
    config: AppConfig,
    gateway: Arc<dyn PeripheralGateway>,
    frontend: Arc<dyn UiAssetProvider>,
) -> anyhow::Result<()> {
    tokio::select! {
        result = apboard_core::run_panel(config, gateway, frontend) => {
            result.context("control panel stopped")
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("👋 Received Ctrl-C, shutting down.");
            Ok(())
        }
    }
}
