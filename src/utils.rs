use crate::error::{HubError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Downloads an image and returns it base64 encoded.
pub async fn url_to_base64(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| HubError::RequestError(format!("Image download failed ({}): {}", url, e)))?;

    if !response.status().is_success() {
        return Err(HubError::ResponseError(format!(
            "Image download failed ({}): HTTP {}",
            url,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| HubError::ResponseError(format!("Failed reading image bytes: {}", e)))?;

    Ok(bytes_to_base64(&bytes))
}

/// Clips long upstream error bodies before they end up in logs.
pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let clipped: String = value.chars().take(max_chars).collect();
    format!("{}...", clipped)
}
