//! Helpers for binary resources referenced from a page.

use base64::Engine;

use super::{BrowserError, BrowserResult};

/// Decoded `data:` URL payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePayload {
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

pub fn is_inline(source: &str) -> bool {
    source.starts_with("data:")
}

/// Decode a `data:[<mime>][;base64],<payload>` URL.
pub fn decode_data_url(source: &str) -> BrowserResult<InlinePayload> {
    let rest = source
        .strip_prefix("data:")
        .ok_or_else(|| BrowserError::Download("not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| BrowserError::Download("data URL has no payload".to_string()))?;

    let is_base64 = header.ends_with(";base64");
    let mime = header.trim_end_matches(";base64");
    let mime_type = (!mime.is_empty()).then(|| mime.to_string());

    let data = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| BrowserError::Download(format!("invalid base64 payload: {}", e)))?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(InlinePayload { mime_type, data })
}

/// Short description of a resource source, safe to persist. Inline payloads
/// collapse to their header.
pub fn describe_source(source: &str) -> String {
    if is_inline(source) {
        source
            .split_once(',')
            .map(|(header, _)| header.to_string())
            .unwrap_or_else(|| "data:".to_string())
    } else {
        source.to_string()
    }
}

/// Resolve a path to a full URL, handling both absolute and relative paths.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") || is_inline(path) {
        return path.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(path) {
            return resolved.to_string();
        }
    }

    let base = base_url.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    format!("{}{}", base, path)
}

/// Map MIME type to file extension.
pub fn mime_to_extension(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// File extension for a downloaded image, from its data-URL MIME type or
/// its URL path.
pub fn image_extension(source: &str) -> String {
    if is_inline(source) {
        let mime = decode_data_url(source).ok().and_then(|payload| payload.mime_type);
        return mime_to_extension(mime.as_deref().unwrap_or("")).to_string();
    }

    let path = url::Url::parse(source)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| source.split(['?', '#']).next().unwrap_or("").to_string());

    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}
