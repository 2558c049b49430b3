use anyhow::Context;
use apboard_core::config::{load_config, AppConfig};
use apboard_core::traits::{PeripheralGateway, UiAssetProvider};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod runner;

/// Access-point control panel for a small peripheral board.
#[derive(Debug, Parser)]
#[command(name = "apboard", version)]
struct Args {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind_addr`.
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
}

fn resolve_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            tracing::info!("No config file given, using built-in defaults");
            AppConfig::default()
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    Ok(config)
}

// --- 1. 选择外设后端 ---
#[cfg(not(feature = "backend_nmcli"))]
fn get_gateway(config: &AppConfig) -> Arc<dyn PeripheralGateway> {
    use apboard_core::backends::mock::MockBoard;
    tracing::info!("🚀 Using simulated board");
    Arc::new(
        MockBoard::new()
            .with_geometry(config.display)
            .with_poll_interval(config.wifi.poll_interval),
    )
}

#[cfg(feature = "backend_nmcli")]
fn get_gateway(config: &AppConfig) -> Arc<dyn PeripheralGateway> {
    use apboard_core::backends::board::Board;
    use apboard_core::backends::mock::MockBoard;
    use apboard_core::backends::nmcli::NmcliRadio;
    tracing::info!(
        "🚀 Using nmcli radio on {} (LED, display and sensor simulated)",
        config.wifi.interface_name
    );
    let simulated = Arc::new(MockBoard::new().with_geometry(config.display));
    let radio = Arc::new(NmcliRadio::new(&config.wifi.interface_name, config.wifi.poll_interval));
    Arc::new(Board::new(simulated.clone(), simulated.clone(), simulated, radio))
}

// --- 2. 选择前端实现 ---
#[cfg(not(feature = "frontend_disk"))]
fn get_frontend(_config: &AppConfig) -> Arc<dyn UiAssetProvider> {
    use apboard_core::frontends::embed_frontend::EmbedFrontend;
    tracing::info!("🚀 Using embedded UI frontend");
    Arc::new(EmbedFrontend::new())
}

#[cfg(feature = "frontend_disk")]
fn get_frontend(config: &AppConfig) -> Arc<dyn UiAssetProvider> {
    use apboard_core::frontends::disk_frontend::DiskFrontend;
    tracing::info!("🚀 Using disk UI frontend at {}", config.frontend.disk_root.display());
    Arc::new(DiskFrontend::new(config.frontend.disk_root.clone()))
}

// --- 3. 启动 ---
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let gateway = get_gateway(&config);
    let frontend = get_frontend(&config);

    match runner::run_until_shutdown(config, gateway, frontend).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
