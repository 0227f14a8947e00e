//! Media URL validation.

use reqwest::Url;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Model3d,
}

impl MediaKind {
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => &["jpg", "jpeg", "png", "gif", "webp"],
            MediaKind::Video => &["mp4", "avi", "mov", "wmv", "flv"],
            MediaKind::Model3d => &["obj", "fbx", "3ds", "dae", "stl", "glb"],
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            MediaKind::Image => "image_urls",
            MediaKind::Video => "video_urls",
            MediaKind::Model3d => "model_3d_urls",
        }
    }
}

/// http(s), non-empty host, path ending in an allowed extension.
pub fn validate_url(kind: MediaKind, raw: &str) -> AppResult<()> {
    let invalid = |reason: &str| {
        AppError::validation(format!("{}: invalid URL '{}': {}", kind.field(), raw, reason))
    };

    let url = Url::parse(raw.trim()).map_err(|_| invalid("not a URL"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }

    let path = url.path().to_lowercase();
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext);
    match ext {
        Some(ext) if kind.allowed_extensions().iter().any(|a| *a == ext) => Ok(()),
        _ => Err(invalid(&format!(
            "extension must be one of {}",
            kind.allowed_extensions().join(", ")
        ))),
    }
}

pub fn validate_urls(kind: MediaKind, urls: &[String]) -> AppResult<()> {
    urls.iter().try_for_each(|u| validate_url(kind, u))
}
