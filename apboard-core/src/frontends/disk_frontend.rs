use super::sanitize_asset_path;
use crate::traits::UiAssetProvider;
use crate::{Error, Result};
use async_trait::async_trait;
use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::PathBuf;

/// 从磁盘目录读取 UI 资源，修改页面后无需重新编译
#[derive(Debug, Clone)]
pub struct DiskFrontend {
    root: PathBuf,
}

impl DiskFrontend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl UiAssetProvider for DiskFrontend {
    async fn get_asset(&self, path: &str) -> Result<(Cow<'static, [u8]>, String)> {
        let name = sanitize_asset_path(path).ok_or_else(|| Error::AssetNotFound(path.to_string()))?;
        let file_path = self.root.join(name);

        let data = match tokio::fs::read(&file_path).await {
            Ok(data) => data,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                return Err(Error::AssetNotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let mime = mime_guess::from_path(&file_path).first_or_octet_stream().to_string();
        Ok((Cow::Owned(data), mime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ui_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("ui")
    }

    #[tokio::test]
    async fn reads_assets_from_the_root() {
        let frontend = DiskFrontend::new(ui_dir());
        let (data, mime) = frontend.get_asset("app.js").await.unwrap();
        assert!(mime.contains("javascript"));
        assert!(!data.is_empty());
    }

    #[tokio::test]
    async fn refuses_to_leave_the_root() {
        let frontend = DiskFrontend::new(ui_dir());
        assert!(matches!(
            frontend.get_asset("../Cargo.toml").await,
            Err(Error::AssetNotFound(_))
        ));
        assert!(matches!(
            frontend.get_asset("nope.html").await,
            Err(Error::AssetNotFound(_))
        ));
    }
}
