#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use custom_models::api::{AppState, create_router};
use custom_models::generation::GenerationParams;
use custom_models::inference::{DevicePreference, ModelLoader, TextGenerator};
use custom_models::registry::{ModelConfig, ModelRegistry};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const MODEL_ID: &str = "Qwen/Qwen2.5-0.5B-Instruct";

pub type Reply = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Echoes the prompt followed by a canned continuation, like a causal LM.
pub struct FakeGenerator {
    reply: Reply,
}

impl TextGenerator for FakeGenerator {
    fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        let continuation = (self.reply)(prompt)?;
        Ok(format!("{}{}", prompt, continuation))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FakeLoader {
    reply: Reply,
    fail_load: bool,
    pub loads: AtomicUsize,
    pub prefetches: AtomicUsize,
}

impl FakeLoader {
    pub fn replying(text: &'static str) -> Self {
        Self::with_reply(Arc::new(move |_: &str| -> Result<String> { Ok(text.to_string()) }))
    }

    pub fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            fail_load: false,
            loads: AtomicUsize::new(0),
            prefetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::replying("")
        }
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(
        &self,
        model_id: &str,
        _config: &ModelConfig,
        _device: DevicePreference,
    ) -> Result<Arc<dyn TextGenerator>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            anyhow::bail!("no weights for {}", model_id);
        }
        Ok(Arc::new(FakeGenerator {
            reply: Arc::clone(&self.reply),
        }))
    }

    async fn prefetch(&self, _model_id: &str, _config: &ModelConfig) -> Result<()> {
        self.prefetches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub async fn registry_with(loader: Option<Arc<FakeLoader>>) -> (TempDir, Arc<ModelRegistry>) {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader.map(|l| l as Arc<dyn ModelLoader>);
    let registry = ModelRegistry::open(dir.path().join("models"), loader)
        .await
        .unwrap();
    (dir, Arc::new(registry))
}

pub fn app(registry: Arc<ModelRegistry>) -> axum::Router {
    create_router(AppState {
        registry,
        default_model_id: MODEL_ID.to_string(),
        default_device: DevicePreference::Cpu,
    })
}
