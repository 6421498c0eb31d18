use crate::{
    engines::traits::{ensure_count, ImageEngine},
    error::{HubError, Result},
    models::{Dimensions, EngineParams, EngineRequirement, SizeBucket, SizeCatalog},
    utils::truncate_text,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Deserialize)]
struct OpenAiImagesResponse {
    data: Vec<OpenAiImage>,
}

#[derive(Deserialize)]
struct OpenAiImage {
    b64_json: Option<String>,
}

/// OpenAI's DALL-E image generation API.
pub struct DalleEngine {
    client: Client,
    base_url: String,
    sizes: SizeCatalog,
}

impl DalleEngine {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: OPENAI_API_BASE.to_string(),
            sizes: SizeCatalog::square(256, 512, 1024),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_payload(
        params: &EngineParams,
        prompt: &str,
        dims: Dimensions,
        num_images: u32,
    ) -> Value {
        let mut payload = json!({
            "prompt": prompt,
            "size": dims.to_string(),
            "n": num_images,
            "response_format": "b64_json"
        });
        if let Some(model) = params.get("model").filter(|m| !m.is_empty()) {
            payload["model"] = json!(model);
        }
        payload
    }
}

impl Default for DalleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageEngine for DalleEngine {
    fn name(&self) -> &str {
        "DALL-E"
    }

    fn description(&self) -> &str {
        "OpenAI's DALL-E image generation model"
    }

    fn required_params(&self) -> Vec<EngineRequirement> {
        vec![EngineRequirement::new("api_key", "OpenAI API key")]
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
        self.check_params(params)?;
        let dims = self.dimensions(size)?;
        let payload = Self::build_payload(params, prompt, dims, num_images);

        log::info!("Generating {} image(s) with DALL-E at {}", num_images, dims);

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&params["api_key"])
            .json(&payload)
            .send()
            .await
            .map_err(|e| HubError::RequestError(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::EngineFailure {
                engine: self.name().to_string(),
                message: format!("HTTP {}: {}", status, truncate_text(&body, 512)),
            });
        }

        let parsed: OpenAiImagesResponse = response
            .json()
            .await
            .map_err(|e| HubError::ResponseError(format!("Invalid OpenAI response: {}", e)))?;

        let images = parsed
            .data
            .into_iter()
            .map(|image| {
                image
                    .b64_json
                    .ok_or_else(|| HubError::ResponseError("OpenAI image without b64_json".into()))
            })
            .collect::<Result<Vec<String>>>()?;

        ensure_count(self.name(), images, num_images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_bucket_dimensions() {
        let engine = DalleEngine::new();
        let dims = engine.dimensions(SizeBucket::Small).unwrap();
        let payload = DalleEngine::build_payload(&EngineParams::new(), "a cat", dims, 3);

        assert_eq!(payload["size"], "256x256");
        assert_eq!(payload["n"], 3);
        assert_eq!(payload["response_format"], "b64_json");
        assert!(payload.get("model").is_none());
    }

    #[test]
    fn payload_forwards_optional_model() {
        let mut params = EngineParams::new();
        params.insert("model".into(), "dall-e-3".into());
        let payload =
            DalleEngine::build_payload(&params, "a cat", Dimensions::square(1024), 1);
        assert_eq!(payload["model"], "dall-e-3");
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let engine = DalleEngine::new().with_base_url("http://127.0.0.1:1");
        match engine
            .generate(&EngineParams::new(), "a cat", SizeBucket::Small, 1)
            .await
        {
            Err(HubError::MissingParameter(names)) => assert_eq!(names, vec!["api_key"]),
            other => panic!("expected MissingParameter, got {:?}", other),
        }
    }
}
