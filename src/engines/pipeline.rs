use crate::{
    engines::traits::{ensure_count, ImageEngine},
    error::{HubError, Result},
    models::{Dimensions, EngineParams, EngineRequirement, SizeBucket, SizeCatalog},
    utils::bytes_to_base64,
};
use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A synchronous, compute-bound text-to-image pipeline running in-process.
///
/// `render` may block for a long time; [`PipelineEngine`] always calls it on
/// tokio's blocking pool. Blocking work cannot be aborted from outside, so
/// `cancelled` is raised when the caller gives up (hub timeout, dropped
/// request) and implementations should check it between images.
pub trait ImagePipeline: Send + Sync + 'static {
    /// Returns `num_images` encoded PNG files.
    fn render(
        &self,
        prompt: &str,
        dims: Dimensions,
        num_images: u32,
        cancelled: &AtomicBool,
    ) -> Result<Vec<Vec<u8>>>;
}

/// Raises the flag when the generating future is dropped, finished or not.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub fn cancelled_error() -> HubError {
    HubError::InternalError("rendering cancelled".to_string())
}

pub struct PipelineEngine<P: ImagePipeline> {
    name: String,
    description: String,
    sizes: SizeCatalog,
    pipeline: Arc<P>,
}

impl<P: ImagePipeline> PipelineEngine<P> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, pipeline: P) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sizes: SizeCatalog::square(512, 768, 1024),
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn with_sizes(mut self, sizes: SizeCatalog) -> Self {
        self.sizes = sizes;
        self
    }
}

#[async_trait]
impl<P: ImagePipeline> ImageEngine for PipelineEngine<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn required_params(&self) -> Vec<EngineRequirement> {
        Vec::new()
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
        let pipeline = Arc::clone(&self.pipeline);
        let prompt = prompt.to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancelled));

        log::info!("Running local pipeline {} for {} image(s) at {}", self.name, num_images, dims);

        let rendered = tokio::task::spawn_blocking(move || {
            pipeline.render(&prompt, dims, num_images, &cancelled)
        })
        .await
        .map_err(|e| HubError::InternalError(format!("Pipeline worker failed: {}", e)))??;

        let images = rendered
            .iter()
            .map(|png| bytes_to_base64(png))
            .collect();
        ensure_count(&self.name, images, num_images)
    }
}

/// Renders a two-colour diagonal gradient seeded from the prompt. Useful as a
/// designated fallback engine and for exercising the server without GPUs or
/// credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderPipeline;

impl PlaceholderPipeline {
    fn colors(prompt: &str, index: u32) -> ([u8; 3], [u8; 3]) {
        let mut hasher = DefaultHasher::new();
        prompt.hash(&mut hasher);
        index.hash(&mut hasher);
        let bytes = hasher.finish().to_be_bytes();
        ([bytes[0], bytes[1], bytes[2]], [bytes[3], bytes[4], bytes[5]])
    }
}

impl ImagePipeline for PlaceholderPipeline {
    fn render(
        &self,
        prompt: &str,
        dims: Dimensions,
        num_images: u32,
        cancelled: &AtomicBool,
    ) -> Result<Vec<Vec<u8>>> {
        let span = (dims.width + dims.height).max(1) as f32;

        (0..num_images)
            .map(|index| {
                if cancelled.load(Ordering::SeqCst) {
                    return Err(cancelled_error());
                }
                let (from, to) = Self::colors(prompt, index);
                let image = RgbImage::from_fn(dims.width, dims.height, |x, y| {
                    let t = (x + y) as f32 / span;
                    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
                    Rgb([mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])])
                });

                let mut png = Cursor::new(Vec::new());
                image
                    .write_to(&mut png, ImageFormat::Png)
                    .map_err(|e| HubError::InternalError(format!("PNG encoding failed: {}", e)))?;
                Ok(png.into_inner())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct BrokenPipeline;

    impl ImagePipeline for BrokenPipeline {
        fn render(&self, _: &str, _: Dimensions, _: u32, _: &AtomicBool) -> Result<Vec<Vec<u8>>> {
            Err(HubError::InternalError("out of memory".into()))
        }
    }

    /// Takes 20ms per image and counts how many it finished.
    struct SlowPipeline {
        rendered: Arc<AtomicUsize>,
    }

    impl ImagePipeline for SlowPipeline {
        fn render(
            &self,
            _: &str,
            _: Dimensions,
            num_images: u32,
            cancelled: &AtomicBool,
        ) -> Result<Vec<Vec<u8>>> {
            let mut images = Vec::new();
            for _ in 0..num_images {
                if cancelled.load(Ordering::SeqCst) {
                    return Err(cancelled_error());
                }
                std::thread::sleep(Duration::from_millis(20));
                self.rendered.fetch_add(1, Ordering::SeqCst);
                images.push(vec![0u8]);
            }
            Ok(images)
        }
    }

    #[tokio::test]
    async fn placeholder_renders_png_images() {
        let engine = PipelineEngine::new("Placeholder", "test", PlaceholderPipeline)
            .with_sizes(SizeCatalog::square(8, 16, 32));

        let images = engine
            .generate(&EngineParams::new(), "a red barn", SizeBucket::Small, 2)
            .await
            .unwrap();

        assert_eq!(images.len(), 2);
        let decoded = STANDARD.decode(&images[0]).unwrap();
        assert_eq!(&decoded[..8], b"\x89PNG\r\n\x1a\n");
        assert_ne!(images[0], images[1]);
    }

    #[test]
    fn placeholder_is_deterministic() {
        let flag = AtomicBool::new(false);
        let a = PlaceholderPipeline
            .render("same prompt", Dimensions::square(4), 1, &flag)
            .unwrap();
        let b = PlaceholderPipeline
            .render("same prompt", Dimensions::square(4), 1, &flag)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn placeholder_stops_once_cancelled() {
        let flag = AtomicBool::new(true);
        assert!(PlaceholderPipeline
            .render("x", Dimensions::square(4), 3, &flag)
            .is_err());
    }

    #[tokio::test]
    async fn dropping_the_attempt_stops_blocking_work() {
        let rendered = Arc::new(AtomicUsize::new(0));
        let engine = PipelineEngine::new(
            "Slow",
            "test",
            SlowPipeline {
                rendered: Arc::clone(&rendered),
            },
        );
        let params = EngineParams::new();

        let attempt = tokio::time::timeout(
            Duration::from_millis(50),
            engine.generate(&params, "x", SizeBucket::Small, 50),
        )
        .await;
        assert!(attempt.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let finished = rendered.load(Ordering::SeqCst);
        assert!(finished < 50, "pipeline kept rendering: {}", finished);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rendered.load(Ordering::SeqCst), finished);
    }

    #[tokio::test]
    async fn pipeline_errors_propagate() {
        let engine = PipelineEngine::new("Broken", "test", BrokenPipeline);
        assert!(engine
            .generate(&EngineParams::new(), "x", SizeBucket::Small, 1)
            .await
            .is_err());
    }
}
