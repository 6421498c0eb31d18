use crate::{
    error::{HubError, Result},
    models::{Dimensions, EngineInfo, EngineParams, EngineRequirement, SizeBucket, SizeCatalog},
};
use async_trait::async_trait;

/// A backend able to synthesize images from a text prompt.
///
/// Implementations check their own parameters, perform the call and return
/// exactly `num_images` base64 strings. They never retry; the hub recovers
/// from failures by redistributing work to other engines.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn required_params(&self) -> Vec<EngineRequirement>;

    fn sizes(&self) -> &SizeCatalog;

    async fn generate(
        &self,
        params: &EngineParams,
        prompt: &str,
        size: SizeBucket,
        num_images: u32,
    ) -> Result<Vec<String>>;

    fn convert_size(&self, token: &str) -> Result<SizeBucket> {
        token.parse()
    }

    fn dimensions(&self, size: SizeBucket) -> Result<Dimensions> {
        self.sizes().dimensions(size).ok_or_else(|| {
            HubError::InternalError(format!("{} has no dimensions for '{}'", self.name(), size))
        })
    }

    /// Fails with every missing name at once, before any external call.
    ///
    /// A key that is present but empty or whitespace-only counts as missing.
    fn check_params(&self, params: &EngineParams) -> Result<()> {
        let missing: Vec<String> = self
            .required_params()
            .into_iter()
            .filter(|req| params.get(&req.name).map_or(true, |v| v.trim().is_empty()))
            .map(|req| req.name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HubError::MissingParameter(missing))
        }
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            required_params: self.required_params(),
        }
    }
}

/// Guards against engines returning a different count than requested.
pub(crate) fn ensure_count(engine: &str, images: Vec<String>, expected: u32) -> Result<Vec<String>> {
    if images.len() == expected as usize {
        Ok(images)
    } else {
        Err(HubError::EngineFailure {
            engine: engine.to_string(),
            message: format!("expected {} images, got {}", expected, images.len()),
        })
    }
}
