use crate::{
    error::{HubError, Result},
    logger::LogLevel,
    models::EngineParams,
};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_IMAGES_PER_ENGINE: u32 = 10;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for a single engine attempt. `None` waits forever.
    pub engine_timeout: Option<Duration>,
    /// Largest `num_images` a single request may ask of each engine.
    pub max_images_per_engine: u32,
    /// Engine that absorbs whatever demand redistribution could not place.
    pub fallback_engine: Option<String>,
    pub openai_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
    pub enable_placeholder: bool,
    pub log_json: bool,
    pub log_level: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            engine_timeout: Some(Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS)),
            max_images_per_engine: DEFAULT_MAX_IMAGES_PER_ENGINE,
            fallback_engine: None,
            openai_api_key: None,
            replicate_api_token: None,
            enable_placeholder: true,
            log_json: false,
            log_level: "info".to_string(),
        }
    }
}

impl HubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = non_empty_env("HOST").unwrap_or(defaults.host);
        let port = env::var("PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(defaults.port);
        let engine_timeout = match env::var("ENGINE_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.trim().parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.engine_timeout,
        };
        let max_images_per_engine = env::var("MAX_IMAGES_PER_ENGINE")
            .ok()
            .and_then(|max| max.trim().parse().ok())
            .unwrap_or(defaults.max_images_per_engine);
        let enable_placeholder = env::var("ENABLE_PLACEHOLDER_ENGINE")
            .ok()
            .map_or(defaults.enable_placeholder, |val| parse_flag(&val));
        let log_json = env::var("LOG_JSON")
            .ok()
            .map_or(defaults.log_json, |val| parse_flag(&val));

        HubConfig {
            host,
            port,
            engine_timeout,
            max_images_per_engine,
            fallback_engine: non_empty_env("FALLBACK_ENGINE"),
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            replicate_api_token: non_empty_env("REPLICATE_API_TOKEN"),
            enable_placeholder,
            log_json,
            log_level: non_empty_env("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.engine_timeout = timeout;
        self
    }

    pub fn with_max_images_per_engine(mut self, max: u32) -> Self {
        self.max_images_per_engine = max;
        self
    }

    pub fn with_fallback_engine(mut self, name: impl Into<String>) -> Self {
        self.fallback_engine = Some(name.into());
        self
    }

    /// Rejects settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.max_images_per_engine == 0 {
            return Err(HubError::ConfigError(
                "MAX_IMAGES_PER_ENGINE must be at least 1".into(),
            ));
        }
        self.log_level
            .parse::<LogLevel>()
            .map_err(|e| HubError::ConfigError(format!("LOG_LEVEL: {}", e)))?;
        Ok(())
    }

    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn with_replicate_api_token(mut self, token: impl Into<String>) -> Self {
        self.replicate_api_token = Some(token.into());
        self
    }

    pub fn with_placeholder(mut self, enabled: bool) -> Self {
        self.enable_placeholder = enabled;
        self
    }

    /// Server-side credentials, keyed by engine name. Requests may still
    /// override every value.
    pub fn default_params(&self) -> HashMap<String, EngineParams> {
        let mut defaults = HashMap::new();

        if let Some(key) = &self.openai_api_key {
            defaults.insert(
                "DALL-E".to_string(),
                EngineParams::from([("api_key".to_string(), key.clone())]),
            );
        }

        if let Some(token) = &self.replicate_api_token {
            for engine in ["Replicate", "RealVisXL", "Imagen3-fast"] {
                defaults.insert(
                    engine.to_string(),
                    EngineParams::from([("api_token".to_string(), token.clone())]),
                );
            }
        }

        defaults
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
