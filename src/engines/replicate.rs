use crate::{
    engines::traits::{ensure_count, ImageEngine},
    error::{HubError, Result},
    models::{Dimensions, EngineParams, EngineRequirement, SizeBucket, SizeCatalog},
    utils::{truncate_text, url_to_base64},
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
const REALVIS_XL_MODEL: &str =
    "adirik/realvisxl-v3.0-turbo:3dc73c805b11b4b01a60555e532fd3ab3f0e60d26f6584d9b8ba7e1b95858243";
const IMAGEN3_FAST_MODEL: &str = "google/imagen-3-fast";
pub const REPLICATE_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_REPLICATE_POLL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplicatePreset {
    /// Any model, named by the `model` parameter.
    Generic,
    RealVisXl,
    /// One prediction per image; the model has no `num_outputs`.
    Imagen3Fast,
}

/// Engines hosted on Replicate.com.
pub struct ReplicateEngine {
    name: &'static str,
    description: &'static str,
    preset: ReplicatePreset,
    sizes: SizeCatalog,
    client: Client,
    api_base: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl ReplicateEngine {
    fn with_preset(
        name: &'static str,
        description: &'static str,
        preset: ReplicatePreset,
        sizes: SizeCatalog,
    ) -> Self {
        Self {
            name,
            description,
            preset,
            sizes,
            client: Client::new(),
            api_base: REPLICATE_API_BASE.to_string(),
            poll_interval: REPLICATE_POLL_INTERVAL,
            poll_timeout: DEFAULT_REPLICATE_POLL_TIMEOUT,
        }
    }

    pub fn generic() -> Self {
        Self::with_preset(
            "Replicate",
            "Replicate.com hosted models",
            ReplicatePreset::Generic,
            SizeCatalog::square(256, 512, 1024),
        )
    }

    pub fn realvis_xl() -> Self {
        Self::with_preset(
            "RealVisXL",
            "adirik/realvisxl-v3.0-turbo on Replicate.com",
            ReplicatePreset::RealVisXl,
            SizeCatalog::square(512, 768, 1024),
        )
    }

    pub fn imagen3_fast() -> Self {
        Self::with_preset(
            "Imagen3-fast",
            "google/imagen-3-fast on Replicate.com",
            ReplicatePreset::Imagen3Fast,
            SizeCatalog::square(512, 768, 1024),
        )
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    fn resolve_model<'a>(&self, params: &'a EngineParams) -> &'a str {
        match self.preset {
            ReplicatePreset::Generic => params
                .get("model")
                .map(|m| m.trim())
                .unwrap_or("stability-ai/sdxl"),
            ReplicatePreset::RealVisXl => REALVIS_XL_MODEL,
            ReplicatePreset::Imagen3Fast => IMAGEN3_FAST_MODEL,
        }
    }

    fn build_input(&self, prompt: &str, dims: Dimensions, num_images: u32) -> Value {
        match self.preset {
            ReplicatePreset::Generic => json!({
                "prompt": prompt,
                "width": dims.width,
                "height": dims.height,
                "num_outputs": num_images,
                "output_format": "png"
            }),
            ReplicatePreset::RealVisXl => json!({
                "prompt": prompt,
                "width": dims.width,
                "height": dims.height,
                "num_outputs": num_images,
                "output_format": "png",
                "refine": "no_refiner",
                "scheduler": "DPM++_SDE_Karras",
                "guidance_scale": 2,
                "apply_watermark": false,
                "high_noise_frac": 0.8,
                "negative_prompt": "(worst quality, low quality, illustration, 3d, 2d, painting, cartoons, sketch), open mouth",
                "prompt_strength": 0.8,
                "num_inference_steps": 25
            }),
            ReplicatePreset::Imagen3Fast => json!({
                "prompt": prompt,
                "aspect_ratio": "1:1",
                "safety_filter_level": "block_only_high",
                "output_format": "png"
            }),
        }
    }

    /// `owner/name:version` goes through the versioned endpoint, bare
    /// `owner/name` through the official-model endpoint.
    fn prediction_request(&self, model: &str, input: Value) -> (String, Value) {
        match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.api_base, model),
                json!({ "input": input }),
            ),
        }
    }

    async fn run_prediction(&self, token: &str, model: &str, input: Value) -> Result<Vec<String>> {
        let (url, body) = self.prediction_request(model, input);
        log::debug!("{}: creating prediction for {}", self.name, model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| HubError::RequestError(format!("Replicate request failed: {}", e)))?;

        let mut prediction = self.response_json(response).await?;
        let started = Instant::now();

        loop {
            let status = prediction
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_ascii_lowercase();

            match status.as_str() {
                "succeeded" => break,
                "failed" | "canceled" => {
                    let detail = prediction
                        .get("error")
                        .map(Value::to_string)
                        .unwrap_or_else(|| status.clone());
                    return Err(HubError::EngineFailure {
                        engine: self.name.to_string(),
                        message: format!("prediction {}: {}", status, detail),
                    });
                }
                _ => {}
            }

            if started.elapsed() >= self.poll_timeout {
                return Err(HubError::EngineFailure {
                    engine: self.name.to_string(),
                    message: format!(
                        "prediction still '{}' after {}s",
                        status,
                        self.poll_timeout.as_secs()
                    ),
                });
            }

            let poll_url = prediction
                .pointer("/urls/get")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    HubError::ResponseError("Replicate prediction without urls.get".into())
                })?;

            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(&poll_url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| HubError::RequestError(format!("Replicate poll failed: {}", e)))?;
            prediction = self.response_json(response).await?;
        }

        let mut urls = Vec::new();
        if let Some(output) = prediction.get("output") {
            extract_output_urls(output, &mut urls);
        }
        if urls.is_empty() {
            return Err(HubError::ResponseError(
                "Replicate prediction succeeded without output URLs".into(),
            ));
        }

        let mut images = Vec::with_capacity(urls.len());
        for url in &urls {
            images.push(url_to_base64(&self.client, url).await?);
        }
        Ok(images)
    }

    async fn response_json(&self, response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::EngineFailure {
                engine: self.name.to_string(),
                message: format!("HTTP {}: {}", status, truncate_text(&body, 512)),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| HubError::ResponseError(format!("Invalid Replicate response: {}", e)))
    }
}

fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if trimmed.starts_with("http") && !out.iter().any(|existing| existing == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_output_urls(row, out);
            }
        }
        Value::Object(obj) => {
            for key in ["url", "urls", "output"] {
                if let Some(inner) = obj.get(key) {
                    extract_output_urls(inner, out);
                }
            }
        }
        _ => {}
    }
}

#[async_trait]
impl ImageEngine for ReplicateEngine {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn required_params(&self) -> Vec<EngineRequirement> {
        let mut params = vec![EngineRequirement::new("api_token", "Replicate API token")];
        if self.preset == ReplicatePreset::Generic {
            params.push(EngineRequirement::new(
                "model",
                "Model identifier on Replicate",
            ));
        }
        params
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
        let token = params
            .get("api_token")
            .map(String::as_str)
            .ok_or_else(|| HubError::MissingParameter(vec!["api_token".to_string()]))?;
        let model = self.resolve_model(params);

        log::info!(
            "Generating {} image(s) with {} ({}) at {}",
            num_images,
            self.name,
            model,
            dims
        );

        let images = match self.preset {
            ReplicatePreset::Imagen3Fast => {
                let mut images = Vec::with_capacity(num_images as usize);
                for _ in 0..num_images {
                    let input = self.build_input(prompt, dims, 1);
                    images.extend(self.run_prediction(token, model, input).await?);
                }
                images
            }
            _ => {
                let input = self.build_input(prompt, dims, num_images);
                self.run_prediction(token, model, input).await?
            }
        };

        ensure_count(self.name, images, num_images)
    }
}
