use rgenhub::{default_registry, logger, server, HubConfig, ImageGeneratorHub};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let config = HubConfig::from_env();
    config.validate()?;
    logger::init_with_config(logger::LoggerConfig::from_hub_config(&config))?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    logger::log_startup_info("rgenhub", env!("CARGO_PKG_VERSION"), &config);

    let registry = match default_registry(&config) {
        Ok(registry) => registry,
        Err(e) => {
            log::error!("❌ Failed to build engine registry: {}", e);
            return Err(e.into());
        }
    };
    logger::log_config_info(&config, &registry);

    if let Some(fallback) = &config.fallback_engine {
        if !registry.contains(fallback) {
            log::warn!(
                "⚠️  FALLBACK_ENGINE '{}' is not a registered engine and will be ignored",
                fallback
            );
        }
    }

    let hub = ImageGeneratorHub::from_config(registry, &config);
    server::run(hub, &config).await?;

    log::info!("👋 Server stopped");
    Ok(())
}
