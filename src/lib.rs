//! Multi-engine image generation gateway.
//!
//! A [`GenerationRequest`] names several engines. The [`ImageGeneratorHub`]
//! splits the requested image count across them, runs them concurrently and,
//! when some fail, moves the shortfall onto engines that are still healthy.

pub mod config;
pub mod engines;
pub mod error;
pub mod hub;
pub mod logger;
pub mod models;
#[cfg(feature = "server")]
pub mod server;
pub mod utils;

pub use config::HubConfig;
pub use engines::{default_registry, EngineRegistry, ImageEngine};
pub use error::{HubError, Result};
pub use hub::{Attempt, ImageGeneratorHub};
pub use models::*;
