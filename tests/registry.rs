mod common;

use common::{FakeLoader, MODEL_ID, registry_with};
use custom_models::generation::GenerationOverrides;
use custom_models::inference::DevicePreference;
use custom_models::registry::{CONFIG_FILE, LoadOutcome, ModelConfig, ModelRegistry, RegistryError};
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn open_writes_default_catalogue() {
    let (_dir, registry) = registry_with(Some(Arc::new(FakeLoader::replying("hi")))).await;

    let path = registry.config_path();
    assert!(path.ends_with(CONFIG_FILE));
    let raw = std::fs::read_to_string(&path).unwrap();
    let on_disk: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(on_disk.get(MODEL_ID).is_some());

    let models = registry.available_models().await;
    assert!(models.iter().any(|m| m.id == MODEL_ID && !m.loaded));
}

#[tokio::test]
async fn added_models_survive_reopen() {
    let (dir, registry) = registry_with(None).await;
    let mut cfg = ModelConfig::named("Tiny");
    cfg.gguf_repo = Some("org/tiny-GGUF".to_string());
    cfg.temperature = 0.2;
    registry.add_model("org/tiny", cfg.clone()).await.unwrap();

    let reopened = ModelRegistry::open(dir.path().join("models"), None).await.unwrap();
    assert_eq!(reopened.config("org/tiny").await, Some(cfg));
    assert!(reopened.config(MODEL_ID).await.is_some());
}

#[tokio::test]
async fn broken_catalogue_leaves_registry_empty() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    std::fs::create_dir_all(&models).unwrap();
    std::fs::write(models.join(CONFIG_FILE), "{not json").unwrap();

    let registry = ModelRegistry::open(&models, None).await.unwrap();
    assert!(registry.available_models().await.is_empty());
    assert_eq!(std::fs::read_to_string(models.join(CONFIG_FILE)).unwrap(), "{not json");
}

#[tokio::test]
async fn load_is_idempotent() {
    let loader = Arc::new(FakeLoader::replying("hi"));
    let (_dir, registry) = registry_with(Some(Arc::clone(&loader))).await;

    let first = registry.load_model(MODEL_ID, DevicePreference::Cpu).await.unwrap();
    let second = registry.load_model(MODEL_ID, DevicePreference::Cpu).await.unwrap();
    assert_eq!(first, LoadOutcome::Loaded);
    assert_eq!(second, LoadOutcome::AlreadyLoaded);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(registry.loaded_device(MODEL_ID).await, Some(DevicePreference::Cpu));

    assert!(registry.unload_model(MODEL_ID).await);
    assert!(!registry.unload_model(MODEL_ID).await);
    assert!(!registry.is_loaded(MODEL_ID).await);
}

#[tokio::test]
async fn concurrent_loads_share_one_pipeline() {
    let loader = Arc::new(FakeLoader::replying("hi"));
    let (_dir, registry) = registry_with(Some(Arc::clone(&loader))).await;

    let a = registry.load_model(MODEL_ID, DevicePreference::Auto);
    let b = registry.load_model(MODEL_ID, DevicePreference::Auto);
    let (a, b) = tokio::join!(a, b);
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_model_is_not_found() {
    let (_dir, registry) = registry_with(Some(Arc::new(FakeLoader::replying("hi")))).await;
    let err = registry
        .load_model("nobody/nothing", DevicePreference::Auto)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(ref id) if id == "nobody/nothing"));
    assert_eq!(err.to_string(), "Model nobody/nothing not found in configurations");
}

#[tokio::test]
async fn no_loader_means_unavailable() {
    let (_dir, registry) = registry_with(None).await;
    assert!(!registry.is_available());
    let err = registry.load_model(MODEL_ID, DevicePreference::Auto).await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable));
    let err = registry.download_model(MODEL_ID).await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable));
}

#[tokio::test]
async fn failed_load_is_reported_and_not_cached() {
    let (_dir, registry) = registry_with(Some(Arc::new(FakeLoader::failing()))).await;
    let err = registry.load_model(MODEL_ID, DevicePreference::Auto).await.unwrap_err();
    assert!(matches!(err, RegistryError::Load { .. }));
    assert!(err.to_string().contains("no weights"));
    assert!(!registry.is_loaded(MODEL_ID).await);
}

#[tokio::test]
async fn download_goes_through_prefetch() {
    let loader = Arc::new(FakeLoader::replying("hi"));
    let (_dir, registry) = registry_with(Some(Arc::clone(&loader))).await;
    registry.download_model(MODEL_ID).await.unwrap();
    assert_eq!(loader.prefetches.load(Ordering::SeqCst), 1);
    assert!(matches!(
        registry.download_model("x/y").await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn generated_text_drops_the_prompt_echo() {
    let (_dir, registry) = registry_with(Some(Arc::new(FakeLoader::replying(" and then some.")))).await;
    registry.load_model(MODEL_ID, DevicePreference::Auto).await.unwrap();

    let text = registry
        .generate_text(MODEL_ID, "Once upon a time", &GenerationOverrides::default())
        .await
        .unwrap();
    assert_eq!(text, "and then some.");
}

#[tokio::test]
async fn empty_continuation_is_no_text() {
    let (_dir, registry) = registry_with(Some(Arc::new(FakeLoader::replying("   ")))).await;
    registry.load_model(MODEL_ID, DevicePreference::Auto).await.unwrap();
    let err = registry
        .generate_text(MODEL_ID, "Hello", &GenerationOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NoText));
}

#[tokio::test]
async fn generation_needs_a_loaded_model() {
    let (_dir, registry) = registry_with(Some(Arc::new(FakeLoader::replying("x")))).await;
    let err = registry
        .generate_text(MODEL_ID, "Hello", &GenerationOverrides::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), format!("Model {} not loaded", MODEL_ID));
}

#[tokio::test]
async fn generator_errors_surface_as_generation_errors() {
    let loader = FakeLoader::with_reply(Arc::new(|_: &str| -> anyhow::Result<String> {
        anyhow::bail!("out of memory")
    }));
    let (_dir, registry) = registry_with(Some(Arc::new(loader))).await;
    registry.load_model(MODEL_ID, DevicePreference::Auto).await.unwrap();
    let err = registry
        .generate_text(MODEL_ID, "Hello", &GenerationOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Generation(ref m) if m.contains("out of memory")));
}
