//! UI asset delivery. The embedded frontend is always available; the disk
//! frontend serves a directory for UI development without rebuilding.

pub mod embed_frontend;

#[cfg(feature = "frontend_disk")]
pub mod disk_frontend;

/// 资源路径不能为空，也不能跳出资源根目录
pub(crate) fn sanitize_asset_path(path: &str) -> Option<&str> {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.contains('\\') {
        return None;
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return None;
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_relative_paths() {
        assert_eq!(sanitize_asset_path("index.html"), Some("index.html"));
        assert_eq!(sanitize_asset_path("/app.js"), Some("app.js"));
        assert_eq!(sanitize_asset_path("img/logo.png"), Some("img/logo.png"));
    }

    #[test]
    fn rejects_traversal_and_empty_segments() {
        for bad in ["", "/", "../secret", "a/../../b", "./index.html", "a//b", "..\\x"] {
            assert_eq!(sanitize_asset_path(bad), None, "{bad:?}");
        }
    }
}
