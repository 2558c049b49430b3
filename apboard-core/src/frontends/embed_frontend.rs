use super::sanitize_asset_path;
use crate::traits::UiAssetProvider;
use crate::{Error, Result};
use async_trait::async_trait;
use rust_embed::RustEmbed;
use std::borrow::Cow;

#[derive(RustEmbed)]
#[folder = "ui/"]
struct PanelAssets;

/// Serves the control panel page compiled into the binary.
#[derive(Debug, Default)]
pub struct EmbedFrontend;

impl EmbedFrontend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UiAssetProvider for EmbedFrontend {
    async fn get_asset(&self, path: &str) -> Result<(Cow<'static, [u8]>, String)> {
        let not_found = || Error::AssetNotFound(path.to_string());
        let name = sanitize_asset_path(path).ok_or_else(not_found)?;
        let asset = PanelAssets::get(name).ok_or_else(not_found)?;
        let mime = mime_guess::from_path(name).first_or_octet_stream().to_string();
        Ok((asset.data, mime))
    }
}
