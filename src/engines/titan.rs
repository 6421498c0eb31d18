use crate::{
    engines::traits::{ensure_count, ImageEngine},
    error::{HubError, Result},
    models::{Dimensions, EngineParams, EngineRequirement, SizeBucket, SizeCatalog},
};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::{
    config::{Credentials, Region},
    error::ProvideErrorMetadata,
    primitives::Blob,
    Client,
};
use serde::Deserialize;
use serde_json::{json, Value};

const TITAN_MODEL_ID: &str = "amazon.titan-image-generator-v1";
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Deserialize)]
struct TitanImageResponse {
    #[serde(default)]
    images: Vec<String>,
    error: Option<String>,
}

/// Amazon Titan Image Generator on AWS Bedrock, called with the caller's own
/// AWS credentials.
pub struct TitanEngine {
    model_id: String,
    sizes: SizeCatalog,
}

impl TitanEngine {
    pub fn new() -> Self {
        Self {
            model_id: TITAN_MODEL_ID.to_string(),
            sizes: SizeCatalog::square(512, 768, 1024),
        }
    }

    async fn client_for(params: &EngineParams) -> Result<Client> {
        let credential = |key: &str| {
            params
                .get(key)
                .cloned()
                .ok_or_else(|| HubError::MissingParameter(vec![key.to_string()]))
        };

        let region = params
            .get("region")
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGION)
            .to_string();

        let aws_config = aws_config::from_env()
            .credentials_provider(Credentials::new(
                credential("access_key")?,
                credential("secret_key")?,
                params.get("session_token").cloned(),
                None,
                "rgenhub-titan",
            ))
            .region(Region::new(region))
            .load()
            .await;

        Ok(Client::new(&aws_config))
    }

    fn build_payload(prompt: &str, dims: Dimensions, num_images: u32) -> Value {
        json!({
            "taskType": "TEXT_IMAGE",
            "textToImageParams": {
                "text": prompt,
            },
            "imageGenerationConfig": {
                "numberOfImages": num_images,
                "width": dims.width,
                "height": dims.height,
                "quality": "standard",
                "cfgScale": 8.0
            }
        })
    }
}

impl Default for TitanEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageEngine for TitanEngine {
    fn name(&self) -> &str {
        "Titan"
    }

    fn description(&self) -> &str {
        "Amazon Titan Image Generator via AWS Bedrock"
    }

    fn required_params(&self) -> Vec<EngineRequirement> {
        vec![
            EngineRequirement::new("access_key", "AWS access key id"),
            EngineRequirement::new("secret_key", "AWS secret access key"),
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
        self.check_params(params)?;
        let dims = self.dimensions(size)?;

        let request_json = serde_json::to_string(&Self::build_payload(prompt, dims, num_images))
            .map_err(|e| HubError::SerializationError(e.to_string()))?;

        log::info!("Generating image with model: {}", self.model_id);

        let client = Self::client_for(params).await?;
        let response = client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_json.into_bytes()))
            .send()
            .await
            .map_err(|e| {
                if let Some(service_error) = e.as_service_error() {
                    HubError::AwsError(format!(
                        "Bedrock service error: {} - {}",
                        service_error.code().unwrap_or("unknown"),
                        service_error.message().unwrap_or("no message")
                    ))
                } else {
                    HubError::AwsError(format!("AWS SDK error: {}", e))
                }
            })?;

        let titan_response: TitanImageResponse =
            serde_json::from_slice(&response.body.into_inner())
                .map_err(|e| HubError::ResponseError(e.to_string()))?;

        if let Some(error) = titan_response.error.filter(|e| !e.is_empty()) {
            return Err(HubError::EngineFailure {
                engine: self.name().to_string(),
                message: error,
            });
        }

        ensure_count(self.name(), titan_response.images, num_images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_dimensions_and_count() {
        let payload = TitanEngine::build_payload("a fox", Dimensions::square(768), 2);
        assert_eq!(payload["taskType"], "TEXT_IMAGE");
        assert_eq!(payload["textToImageParams"]["text"], "a fox");
        assert_eq!(payload["imageGenerationConfig"]["numberOfImages"], 2);
        assert_eq!(payload["imageGenerationConfig"]["width"], 768);
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let params = EngineParams::from([("access_key".to_string(), "AKIA".to_string())]);
        match TitanEngine::new()
            .generate(&params, "a fox", SizeBucket::Large, 1)
            .await
        {
            Err(HubError::MissingParameter(names)) => assert_eq!(names, vec!["secret_key"]),
            other => panic!("expected MissingParameter, got {:?}", other),
        }
    }
}
