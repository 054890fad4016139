use anyhow::Result;
use custom_models::api::{self, AppState};
use custom_models::config::Config;
use custom_models::inference::{self, DevicePreference};
use custom_models::init;
use custom_models::registry::ModelRegistry;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::load("config.json").await?;
    init::ensure_directories(&cfg.models_dir).await?;

    if !init::local_models_available() {
        eprintln!("[WARNING] Built without the `local-models` feature; every endpoint will answer 503.");
    }

    let default_device: DevicePreference = cfg.default_device.parse()?;
    let loader = inference::default_loader(&cfg.models_dir);
    let registry = Arc::new(ModelRegistry::open(&cfg.models_dir, loader).await?);

    if cfg.preload_default_model && registry.is_available() {
        if let Err(e) = registry.load_model(&cfg.default_model_id, default_device).await {
            eprintln!("[WARNING] Preloading {} failed: {}", cfg.default_model_id, e);
        }
    }

    let state = AppState {
        registry,
        default_model_id: cfg.default_model_id.clone(),
        default_device,
    };
    api::serve(&cfg.listen_addr, state).await
}
