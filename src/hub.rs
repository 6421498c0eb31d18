use crate::{
    config::{HubConfig, DEFAULT_MAX_IMAGES_PER_ENGINE},
    engines::{EngineRegistry, ImageEngine},
    error::{HubError, Result},
    logger,
    models::{
        EngineConfig, EngineInfo, EngineParams, GeneratedImage, GenerationRequest,
        GenerationResponse, SizeBucket,
    },
};
use futures::{stream::FuturesUnordered, FutureExt, StreamExt};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of one engine attempt. Failures are data here, never errors, so one
/// engine going down cannot abort its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Succeeded(Vec<GeneratedImage>),
    Failed(String),
}

impl Attempt {
    pub fn is_success(&self) -> bool {
        matches!(self, Attempt::Succeeded(_))
    }

    pub fn into_parts(self) -> (bool, Vec<GeneratedImage>) {
        match self {
            Attempt::Succeeded(images) => (true, images),
            Attempt::Failed(_) => (false, Vec::new()),
        }
    }
}

/// Splits a request across engines, runs the primary share concurrently and
/// moves any shortfall onto engines that have not failed yet.
pub struct ImageGeneratorHub {
    registry: Arc<EngineRegistry>,
    fallback_engine: Option<String>,
    engine_timeout: Option<Duration>,
    max_images_per_engine: u32,
    default_params: HashMap<String, EngineParams>,
}

impl ImageGeneratorHub {
    pub fn new(registry: EngineRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            fallback_engine: None,
            engine_timeout: None,
            max_images_per_engine: DEFAULT_MAX_IMAGES_PER_ENGINE,
            default_params: HashMap::new(),
        }
    }

    pub fn from_config(registry: EngineRegistry, config: &HubConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            fallback_engine: config.fallback_engine.clone(),
            engine_timeout: config.engine_timeout,
            max_images_per_engine: config.max_images_per_engine,
            default_params: config.default_params(),
        }
    }

    pub fn with_fallback_engine(mut self, name: impl Into<String>) -> Self {
        self.fallback_engine = Some(name.into());
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = Some(timeout);
        self
    }

    pub fn with_max_images_per_engine(mut self, max: u32) -> Self {
        self.max_images_per_engine = max;
        self
    }

    pub fn with_default_params(mut self, engine: impl Into<String>, params: EngineParams) -> Self {
        self.default_params.insert(engine.into(), params);
        self
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn fallback_engine(&self) -> Option<&str> {
        self.fallback_engine.as_deref()
    }

    pub fn list_engines(&self) -> Vec<EngineInfo> {
        self.registry.list()
    }

    /// Runs a single engine and never fails: size errors, missing parameters,
    /// transport errors, timeouts and panics all come back as
    /// [`Attempt::Failed`].
    pub async fn try_generate(
        &self,
        engine: &dyn ImageEngine,
        config: &EngineConfig,
        size_token: &str,
        num_images: u32,
    ) -> Attempt {
        let size = match engine.convert_size(size_token) {
            Ok(size) => size,
            Err(e) => return Attempt::Failed(e.to_string()),
        };
        let params = self.effective_params(config);

        let call = AssertUnwindSafe(engine.generate(&params, &config.prompt, size, num_images))
            .catch_unwind();

        let outcome = match self.engine_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(HubError::Timeout {
                    engine: engine.name().to_string(),
                    seconds: limit.as_secs(),
                })),
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(encoded)) => Attempt::Succeeded(
                encoded
                    .into_iter()
                    .map(|base64_image| GeneratedImage {
                        engine_name: engine.name().to_string(),
                        base64_image,
                    })
                    .collect(),
            ),
            Ok(Err(e)) => {
                log::warn!("Engine {} failed: {}", engine.name(), e);
                Attempt::Failed(e.to_string())
            }
            Err(_) => {
                log::error!("Engine {} panicked during generation", engine.name());
                Attempt::Failed(format!("engine {} panicked", engine.name()))
            }
        }
    }

    /// Request params layered over the server-side defaults for that engine.
    fn effective_params(&self, config: &EngineConfig) -> EngineParams {
        match self.default_params.get(&config.name) {
            Some(defaults) => {
                let mut merged = defaults.clone();
                merged.extend(config.params.clone());
                merged
            }
            None => config.params.clone(),
        }
    }

    /// Primary phase, redistribution phase and designated-fallback phase.
    /// Returns the images collected and the names of engines that failed.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate_with_redistribution(
        &self,
        request_id: &str,
        engine_configs: &[EngineConfig],
        size_token: &str,
        total_images: usize,
        images_per_engine: u32,
        num_engines_to_use: usize,
        use_fallback: bool,
    ) -> Result<(Vec<GeneratedImage>, Vec<String>)> {
        let mut generated: Vec<GeneratedImage> = Vec::new();
        let mut failed_engines: Vec<String> = Vec::new();
        let mut remaining = total_images;

        let primary = &engine_configs[..num_engines_to_use.min(engine_configs.len())];
        let mut primary_failures: Vec<(usize, String)> = Vec::new();
        let mut attempts = FuturesUnordered::new();

        for (idx, config) in primary.iter().enumerate() {
            match self.registry.get(&config.name) {
                Some(engine) => {
                    let engine = engine.as_ref();
                    attempts.push(async move {
                        let attempt = self
                            .try_generate(engine, config, size_token, images_per_engine)
                            .await;
                        (idx, attempt)
                    });
                }
                None => {
                    if !use_fallback {
                        return Err(HubError::EngineNotFound(config.name.clone()));
                    }
                    log::warn!("[{}] Engine {} is not registered", request_id, config.name);
                    primary_failures.push((idx, config.name.clone()));
                }
            }
        }

        log::debug!(
            "[{}] Primary phase: {} engine(s) x {} image(s)",
            request_id,
            attempts.len(),
            images_per_engine
        );

        while let Some((idx, attempt)) = attempts.next().await {
            match attempt {
                Attempt::Succeeded(images) => {
                    log::info!(
                        "[{}] {} produced {} image(s)",
                        request_id,
                        primary[idx].name,
                        images.len()
                    );
                    generated.extend(images);
                    remaining = remaining.saturating_sub(images_per_engine as usize);
                }
                Attempt::Failed(_) => primary_failures.push((idx, primary[idx].name.clone())),
            }
        }

        primary_failures.sort_by_key(|(idx, _)| *idx);
        for (_, name) in primary_failures {
            push_unique(&mut failed_engines, name);
        }

        if !use_fallback {
            if let Some(name) = failed_engines.first() {
                return Err(HubError::AggregateFailure(format!(
                    "Engine {} failed to generate images",
                    name
                )));
            }
        }

        if use_fallback && remaining > 0 {
            log::info!(
                "[{}] Redistributing {} image(s) away from {:?}",
                request_id,
                remaining,
                failed_engines
            );

            for config in engine_configs {
                if remaining == 0 {
                    break;
                }
                if failed_engines.contains(&config.name) {
                    continue;
                }

                let Some(engine) = self.registry.get(&config.name) else {
                    push_unique(&mut failed_engines, config.name.clone());
                    continue;
                };

                match self
                    .try_generate(engine.as_ref(), config, size_token, image_count(remaining)?)
                    .await
                {
                    Attempt::Succeeded(images) => {
                        log::info!(
                            "[{}] {} absorbed the remaining {} image(s)",
                            request_id,
                            config.name,
                            remaining
                        );
                        generated.extend(images);
                        remaining = 0;
                        break;
                    }
                    Attempt::Failed(_) => push_unique(&mut failed_engines, config.name.clone()),
                }
            }
        }

        if use_fallback && remaining > 0 {
            if let Some(images) = self
                .run_designated_fallback(
                    request_id,
                    engine_configs,
                    size_token,
                    image_count(remaining)?,
                    &mut failed_engines,
                )
                .await
            {
                generated.extend(images);
            }
        }

        Ok((generated, failed_engines))
    }

    async fn run_designated_fallback(
        &self,
        request_id: &str,
        engine_configs: &[EngineConfig],
        size_token: &str,
        remaining: u32,
        failed_engines: &mut Vec<String>,
    ) -> Option<Vec<GeneratedImage>> {
        let name = self.fallback_engine.as_deref()?;
        if failed_engines.iter().any(|failed| failed == name) {
            return None;
        }
        let Some(engine) = self.registry.get(name) else {
            log::warn!(
                "[{}] Fallback engine {} is not registered; skipping",
                request_id,
                name
            );
            return None;
        };

        let config = engine_configs
            .iter()
            .find(|config| config.name == name)
            .cloned()
            .unwrap_or_else(|| EngineConfig {
                name: name.to_string(),
                params: EngineParams::new(),
                prompt: engine_configs
                    .first()
                    .map(|config| config.prompt.clone())
                    .unwrap_or_default(),
            });

        log::info!(
            "[{}] Falling back to {} for {} image(s)",
            request_id,
            name,
            remaining
        );

        match self
            .try_generate(engine.as_ref(), &config, size_token, remaining)
            .await
        {
            Attempt::Succeeded(images) => Some(images),
            Attempt::Failed(_) => {
                push_unique(failed_engines, name.to_string());
                None
            }
        }
    }

    pub async fn generate_images(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        if request.num_engines_to_use == 0 {
            return Err(HubError::InvalidRequest(
                "num_engines_to_use must be at least 1".into(),
            ));
        }
        if request.num_engines_to_use > request.engines.len() {
            return Err(HubError::InvalidRequest(
                "num_engines_to_use cannot be greater than number of provided engines".into(),
            ));
        }
        if request.num_images == 0 {
            return Err(HubError::InvalidRequest(
                "num_images must be at least 1".into(),
            ));
        }
        if request.num_images > self.max_images_per_engine {
            return Err(HubError::InvalidRequest(format!(
                "num_images cannot be greater than {}",
                self.max_images_per_engine
            )));
        }
        let total_images = request.total_images().ok_or_else(|| {
            HubError::InvalidRequest("requested image count is too large".into())
        })?;
        request.image_size.parse::<SizeBucket>()?;

        let request_id = Uuid::new_v4().to_string();
        let _timer = logger::timer(&format!("generate[{}]", request_id));

        log::info!(
            "[{}] {} image(s) across {} engine(s), size={}, fallback={}",
            request_id,
            total_images,
            request.num_engines_to_use,
            request.image_size,
            request.use_fallback
        );

        let (images, failed_engines) = self
            .generate_with_redistribution(
                &request_id,
                &request.engines,
                &request.image_size,
                total_images,
                request.num_images,
                request.num_engines_to_use,
                request.use_fallback,
            )
            .await?;

        if images.is_empty() {
            log::error!("[{}] No engine could generate images", request_id);
            return Err(HubError::AggregateFailure(
                "No engine could generate images".into(),
            ));
        }

        if images.len() < total_images {
            if !request.use_fallback {
                return Err(HubError::AggregateFailure(
                    "Failed to generate requested number of images".into(),
                ));
            }
            log::warn!(
                "[{}] Partial result: {}/{} image(s), failed engines: {:?}",
                request_id,
                images.len(),
                total_images,
                failed_engines
            );
        }

        Ok(GenerationResponse {
            images,
            failed_engines,
        })
    }
}

/// Engines take a `u32` count; anything larger is refused rather than
/// truncated.
fn image_count(remaining: usize) -> Result<u32> {
    u32::try_from(remaining).map_err(|_| {
        HubError::InvalidRequest(format!("cannot request {} images in one call", remaining))
    })
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}
