pub mod dalle;
pub mod local;
pub mod mock;
pub mod pipeline;
pub mod replicate;
pub mod titan;
pub mod traits;

use crate::{
    config::HubConfig,
    error::{HubError, Result},
    models::EngineInfo,
};
use std::sync::Arc;

pub use dalle::DalleEngine;
pub use local::LocalServiceEngine;
pub use mock::{MockEngine, MockOutcome};
pub use pipeline::{cancelled_error, ImagePipeline, PipelineEngine, PlaceholderPipeline};
pub use replicate::{ReplicateEngine, DEFAULT_REPLICATE_POLL_TIMEOUT, REPLICATE_POLL_INTERVAL};
pub use titan::TitanEngine;
pub use traits::ImageEngine;

/// Name -> engine table, built once at startup and read concurrently after.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn ImageEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the engine, replacing any engine already registered under the
    /// same name. Engines whose size catalog is not exactly small/medium/large
    /// are rejected.
    pub fn register(&mut self, engine: Arc<dyn ImageEngine>) -> Result<()> {
        engine
            .sizes()
            .validate()
            .map_err(|reason| HubError::InvalidSizeCatalog {
                engine: engine.name().to_string(),
                reason,
            })?;

        match self.engines.iter().position(|e| e.name() == engine.name()) {
            Some(idx) => {
                log::debug!("Replacing engine: {}", engine.name());
                self.engines[idx] = engine;
            }
            None => {
                log::debug!("Registered engine: {}", engine.name());
                self.engines.push(engine);
            }
        }
        Ok(())
    }

    pub fn with_engine(mut self, engine: Arc<dyn ImageEngine>) -> Result<Self> {
        self.register(engine)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ImageEngine>> {
        self.engines.iter().find(|engine| engine.name() == name)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn ImageEngine>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| HubError::EngineNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registration order is preserved, so repeated listings are identical.
    pub fn list(&self) -> Vec<EngineInfo> {
        self.engines.iter().map(|engine| engine.info()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.engines
            .iter()
            .map(|engine| engine.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// The engines the server ships with.
pub fn default_registry(config: &HubConfig) -> Result<EngineRegistry> {
    let mut registry = EngineRegistry::new();

    registry.register(Arc::new(DalleEngine::new()))?;
    // polling never outlives the hub's own per-attempt limit
    let poll_timeout = config
        .engine_timeout
        .unwrap_or(DEFAULT_REPLICATE_POLL_TIMEOUT);
    for engine in [
        ReplicateEngine::generic(),
        ReplicateEngine::realvis_xl(),
        ReplicateEngine::imagen3_fast(),
    ] {
        registry.register(Arc::new(
            engine.with_polling(REPLICATE_POLL_INTERVAL, poll_timeout),
        ))?;
    }
    registry.register(Arc::new(LocalServiceEngine::new()))?;
    registry.register(Arc::new(TitanEngine::new()))?;

    if config.enable_placeholder {
        registry.register(Arc::new(PipelineEngine::new(
            "Placeholder",
            "Local pipeline rendering deterministic gradient PNGs (no model weights needed)",
            PlaceholderPipeline,
        )))?;
    }

    Ok(registry)
}
