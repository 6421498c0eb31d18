use crate::{
    engines::traits::ImageEngine,
    error::{HubError, Result},
    models::{EngineParams, EngineRequirement, SizeBucket, SizeCatalog},
    utils::truncate_text,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// A self-hosted generation service speaking a minimal JSON protocol:
/// `POST {prompt, size: "WxH", n}` answered by a JSON array of `n` base64
/// strings.
pub struct LocalServiceEngine {
    client: Client,
    sizes: SizeCatalog,
}

impl LocalServiceEngine {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            sizes: SizeCatalog::square(512, 768, 1024),
        }
    }

    fn build_url(params: &EngineParams) -> Result<String> {
        let host = params
            .get("host")
            .map(|h| h.trim().trim_end_matches('/'))
            .unwrap_or_default();
        let port = params.get("port").map(|p| p.trim()).unwrap_or_default();
        let endpoint = params
            .get("endpoint")
            .map(|e| e.trim().trim_start_matches('/'))
            .unwrap_or_default();

        let missing: Vec<String> = [("host", host), ("port", port), ("endpoint", endpoint)]
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(HubError::MissingParameter(missing));
        }

        Ok(format!("{}:{}/{}", host, port, endpoint))
    }

    fn parse_images(body: Value, expected: u32) -> Result<Vec<String>> {
        let rows = match body {
            Value::Array(rows) if rows.len() == expected as usize => rows,
            _ => {
                return Err(HubError::ResponseError(
                    "Invalid response format from local service".into(),
                ))
            }
        };

        rows.into_iter()
            .map(|row| match row {
                Value::String(image) => Ok(image),
                _ => Err(HubError::ResponseError(
                    "Local service returned a non-string image".into(),
                )),
            })
            .collect()
    }
}

impl Default for LocalServiceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageEngine for LocalServiceEngine {
    fn name(&self) -> &str {
        "Local"
    }

    fn description(&self) -> &str {
        "Custom local image generation service"
    }

    fn required_params(&self) -> Vec<EngineRequirement> {
        vec![
            EngineRequirement::new(
                "host",
                "Host address of the local service (e.g., http://localhost)",
            ),
            EngineRequirement::new("port", "Port number of the local service"),
            EngineRequirement::new("endpoint", "API endpoint for image generation"),
        ]
    }

    fn sizes(&self) -> &SizeCatalog {
        &self.sizes
    }

    async fn generate(
        &self,
        params: &EngineParams,
        prompt: &str,
        size: SizeBucket,
        num_images: u32,
    ) -> Result<Vec<String>> {
        let url = Self::build_url(params)?;
        let dims = self.dimensions(size)?;

        log::info!("Requesting {} image(s) from local service {}", num_images, url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "prompt": prompt,
                "size": dims.to_string(),
                "n": num_images
            }))
            .send()
            .await
            .map_err(|e| {
                HubError::RequestError(format!("Failed to connect to local service: {}", e))
            })?;

        if response.status() != reqwest::StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::EngineFailure {
                engine: self.name().to_string(),
                message: format!("Local service error {}: {}", status, truncate_text(&body, 512)),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HubError::ResponseError(format!("Invalid local service body: {}", e)))?;

        Self::parse_images(body, num_images)
    }
}
