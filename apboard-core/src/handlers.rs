//! 每个路由对应的处理函数。
//!
//! Handlers see the peripherals only through [`PanelContext`]; there is no
//! process-wide state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{DisplayConfig, WifiConfig};
use crate::display::layout_text;
use crate::http::{Request, Response, StatusCode};
use crate::router::{Resolved, Route, Router};
use crate::traits::{ConnectOutcome, PeripheralGateway, UiAssetProvider};
use crate::{Error, Result};

const INDEX_PAGE: &str = "index.html";

/// Everything a handler may touch, passed explicitly into every dispatch.
#[derive(Clone)]
pub struct PanelContext {
    pub gateway: Arc<dyn PeripheralGateway>,
    pub frontend: Arc<dyn UiAssetProvider>,
    pub display: DisplayConfig,
    pub wifi: WifiConfig,
}

/// Routes `req` and runs its handler.
///
/// Unusable parameters become `400`; a path served under another method
/// becomes `405`. Any other error is returned for the caller to turn into
/// `500`.
pub async fn dispatch(ctx: &PanelContext, router: &Router, req: &Request) -> Result<Response> {
    let route = match router.resolve(&req.method, &req.path) {
        Resolved::Route(route) => route,
        Resolved::MethodNotAllowed => {
            return Ok(Response::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"));
        }
    };

    let result = match route {
        Route::Page => handle_page(ctx, req).await,
        Route::Sensor => handle_sensor(ctx).await,
        Route::Color => handle_color(ctx, req).await,
        Route::Message => handle_message(ctx, req).await,
        Route::Scan => handle_scan(ctx).await,
        Route::Connect => handle_connect(ctx, req).await,
    };

    match result {
        Err(err @ Error::InvalidParameter { .. }) => {
            tracing::warn!("Rejected {} {}: {}", req.method, req.path, err);
            Ok(Response::bad_request())
        }
        other => other,
    }
}

/// `GET /` and every unmatched path.
async fn handle_page(ctx: &PanelContext, req: &Request) -> Result<Response> {
    let name = req.path.trim_start_matches('/');
    let name = if name.is_empty() { INDEX_PAGE } else { name };

    let (data, mime) = match ctx.frontend.get_asset(name).await {
        Ok(asset) => asset,
        Err(Error::AssetNotFound(_)) if name != INDEX_PAGE => ctx.frontend.get_asset(INDEX_PAGE).await?,
        Err(e) => return Err(e),
    };
    Ok(Response::new(StatusCode::OK, mime, data.into_owned()))
}

/// `null` fields stand for a failed read.
#[derive(Debug, Serialize)]
struct ClimateJson {
    temperature: Option<f32>,
    humidity: Option<f32>,
}

async fn handle_sensor(ctx: &PanelContext) -> Result<Response> {
    let body = match ctx.gateway.read_climate().await {
        Ok(reading) => ClimateJson {
            temperature: Some(reading.temperature),
            humidity: Some(reading.humidity),
        },
        Err(e) => {
            tracing::warn!("🌡️ {}", Error::from(e));
            ClimateJson {
                temperature: None,
                humidity: None,
            }
        }
    };
    Response::json(&body)
}

async fn handle_color(ctx: &PanelContext, req: &Request) -> Result<Response> {
    let red = color_channel(req.query_param("red"));
    let green = color_channel(req.query_param("green"));
    let blue = color_channel(req.query_param("blue"));
    ctx.gateway.set_pixel(red, green, blue).await?;
    Ok(Response::ok())
}

/// 缺失或非数字按 0 处理，超出范围的值截断到 0..=255
fn color_channel(raw: Option<&str>) -> u8 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| !v.is_nan())
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .unwrap_or(0)
}

async fn handle_message(ctx: &PanelContext, req: &Request) -> Result<Response> {
    let text = req.query_param("text").unwrap_or_default();
    let lines = layout_text(text, &ctx.display);
    ctx.gateway.show_text(&lines).await?;
    Ok(Response::ok())
}

async fn handle_scan(ctx: &PanelContext) -> Result<Response> {
    let networks = ctx.gateway.scan_networks().await?;
    tracing::debug!("Scan returned {} networks", networks.len());
    Response::json(&networks)
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    ssid: String,
    // 开放网络可以省略密码
    #[serde(default)]
    password: String,
}

async fn handle_connect(ctx: &PanelContext, req: &Request) -> Result<Response> {
    let body: ConnectRequest =
        serde_json::from_slice(&req.body).map_err(|e| Error::InvalidParameter {
            name: "body",
            reason: e.to_string(),
        })?;
    if body.ssid.is_empty() {
        return Err(Error::InvalidParameter {
            name: "ssid",
            reason: "must not be empty".to_string(),
        });
    }

    tracing::info!("🔗 Joining '{}' (timeout {:?})", body.ssid, ctx.wifi.join_timeout);
    let outcome = ctx
        .gateway
        .join_network(&body.ssid, &body.password, ctx.wifi.join_timeout)
        .await;

    let (reply, screen) = match &outcome {
        ConnectOutcome::Connected(ip) => {
            tracing::info!("✅ Joined '{}', IP: {}", body.ssid, ip);
            (format!("Connected! IP: {ip}"), format!("Connected\nIP: {ip}"))
        }
        ConnectOutcome::Failed => {
            tracing::warn!("❌ Failed to join '{}'", body.ssid);
            ("Connection Failed".to_string(), "Connection\nFailed".to_string())
        }
    };
    show_best_effort(&*ctx.gateway, &layout_text(&screen, &ctx.display)).await;

    Ok(Response::text(StatusCode::OK, reply))
}

/// 显示屏只是状态提示，写入失败只记录日志
pub(crate) async fn show_best_effort(gateway: &dyn PeripheralGateway, lines: &[String]) {
    if let Err(e) = gateway.show_text(lines).await {
        tracing::warn!("Failed to update display: {}", e);
    }
}
