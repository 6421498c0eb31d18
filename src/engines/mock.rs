use crate::{
    engines::traits::ImageEngine,
    error::{HubError, Result},
    models::{EngineParams, EngineRequirement, SizeBucket, SizeCatalog},
    utils::bytes_to_base64,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Succeed,
    Fail(String),
    /// Never completes; only a hub timeout gets the caller out.
    Hang,
    Panic(String),
}

/// A scripted engine for tests and dry runs. Returns the scripted outcome for
/// each call in order, then `fallback_outcome` once the script runs out.
pub struct MockEngine {
    name: String,
    description: String,
    sizes: SizeCatalog,
    required: Vec<EngineRequirement>,
    script: Vec<MockOutcome>,
    fallback_outcome: MockOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requested: Mutex<Vec<u32>>,
}

impl MockEngine {
    pub fn new(name: impl Into<String>, outcome: MockOutcome) -> Self {
        let name = name.into();
        Self {
            description: format!("Scripted mock engine '{}'", name),
            name,
            sizes: SizeCatalog::square(64, 128, 256),
            required: Vec::new(),
            script: Vec::new(),
            fallback_outcome: outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::new(name, MockOutcome::Succeed)
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self::new(name, MockOutcome::Fail("scripted failure".to_string()))
    }

    pub fn panicking(name: impl Into<String>) -> Self {
        Self::new(name, MockOutcome::Panic("scripted panic".to_string()))
    }

    pub fn hanging(name: impl Into<String>) -> Self {
        Self::new(name, MockOutcome::Hang)
    }

    pub fn with_script(mut self, script: Vec<MockOutcome>) -> Self {
        self.script = script;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_sizes(mut self, sizes: SizeCatalog) -> Self {
        self.sizes = sizes;
        self
    }

    pub fn with_required_param(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.required.push(EngineRequirement::new(name, description));
        self
    }

    /// Number of times `generate` has been entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `num_images` of every call, in call order.
    pub fn requested_counts(&self) -> Vec<u32> {
        self.requested
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ImageEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn required_params(&self) -> Vec<EngineRequirement> {
        self.required.clone()
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
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(num_images);
        }

        self.check_params(params)?;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.script.get(idx).unwrap_or(&self.fallback_outcome);
        match outcome {
            MockOutcome::Succeed => {
                let dims = self.dimensions(size)?;
                Ok((0..num_images)
                    .map(|i| {
                        bytes_to_base64(
                            format!("{}|{}|{}|{}", self.name, prompt, dims, i).as_bytes(),
                        )
                    })
                    .collect())
            }
            MockOutcome::Fail(message) => Err(HubError::EngineFailure {
                engine: self.name.clone(),
                message: message.clone(),
            }),
            MockOutcome::Hang => std::future::pending().await,
            MockOutcome::Panic(message) => panic!("{}", message),
        }
    }
}
