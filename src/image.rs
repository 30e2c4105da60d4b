//! Image file loading for the CLI.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

use gptodo_core::data_uri;

/// MIME type for an image path, from its extension.
///
/// Unknown extensions are sent as JPEG; the backend sniffs the payload
/// anyway.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// Read an image file and return it as a `data:` URI.
pub async fn read_data_uri(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    let encoded = STANDARD.encode(&bytes);
    Ok(data_uri::build(mime_for_path(path), &encoded))
}
