use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Parameters handed to an engine. Values are opaque strings to the hub.
pub type EngineParams = HashMap<String, String>;

/// One engine's slice of a multi-engine request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_params")]
    pub params: EngineParams,
    pub prompt: String,
}

impl EngineConfig {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: EngineParams::new(),
            prompt: prompt.into(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub engines: Vec<EngineConfig>,
    pub num_engines_to_use: usize,
    /// Images requested from each engine.
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default)]
    pub use_fallback: bool,
}

impl GenerationRequest {
    pub fn new(engines: Vec<EngineConfig>, num_engines_to_use: usize) -> Self {
        Self {
            engines,
            num_engines_to_use,
            num_images: default_num_images(),
            image_size: default_image_size(),
            use_fallback: false,
        }
    }

    pub fn with_num_images(mut self, num_images: u32) -> Self {
        self.num_images = num_images;
        self
    }

    pub fn with_image_size(mut self, image_size: impl Into<String>) -> Self {
        self.image_size = image_size.into();
        self
    }

    pub fn with_fallback(mut self, use_fallback: bool) -> Self {
        self.use_fallback = use_fallback;
        self
    }

    /// `None` when the product does not fit in `usize`.
    pub fn total_images(&self) -> Option<usize> {
        self.num_engines_to_use.checked_mul(self.num_images as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub engine_name: String,
    pub base64_image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub images: Vec<GeneratedImage>,
    #[serde(default)]
    pub failed_engines: Vec<String>,
}

fn default_num_images() -> u32 {
    1
}

fn default_image_size() -> String {
    "medium".to_string()
}

/// Accepts scalar JSON values and stores them as strings, so `"port": 8000`
/// and `"port": "8000"` mean the same thing.
fn deserialize_params<'de, D>(deserializer: D) -> std::result::Result<EngineParams, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: HashMap<String, Value> = HashMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "parameter '{}' must be a string, number or boolean, got {}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}
