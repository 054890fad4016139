use crate::defaults::default_model_configs;
use crate::generation::{GenerationOverrides, GenerationParams};
use crate::inference::{DevicePreference, ModelLoader, TextGenerator};
use crate::{loge, logi, logok};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

pub const CONFIG_FILE: &str = "model_configs.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_max_length() -> usize {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_do_sample() -> bool {
    true
}

impl ModelConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            max_length: default_max_length(),
            temperature: default_temperature(),
            do_sample: default_do_sample(),
            pad_token_id: None,
            use_case: None,
            size: None,
            gguf_repo: None,
            gguf_file: None,
            tokenizer_repo: None,
            prompt_template: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Wraps an instruction in the model's chat template, if it has one.
    pub fn render_prompt(&self, instruction: &str) -> String {
        match &self.prompt_template {
            Some(template) if template.contains("{prompt}") => {
                template.replace("{prompt}", instruction)
            }
            _ => instruction.to_string(),
        }
    }

    fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        if self.name.trim().is_empty() { id } else { &self.name }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub loaded: bool,
    pub config: ModelConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    AlreadyLoaded,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Custom models not available. Rebuild with the `local-models` feature enabled")]
    Unavailable,
    #[error("Model {0} not found in configurations")]
    NotFound(String),
    #[error("Model {0} not loaded")]
    NotLoaded(String),
    #[error("Failed to load model {id}: {reason}")]
    Load { id: String, reason: String },
    #[error("Failed to download model {id}: {reason}")]
    Download { id: String, reason: String },
    #[error("No text generated")]
    NoText,
    #[error("{0}")]
    Generation(String),
    #[error("Failed to save model configs: {0}")]
    Persist(String),
}

struct LoadedModel {
    generator: Arc<dyn TextGenerator>,
    device: DevicePreference,
}

/// Named model configurations persisted to `model_configs.json`, plus the
/// pipelines currently held in memory.
pub struct ModelRegistry {
    models_dir: PathBuf,
    configs: RwLock<BTreeMap<String, ModelConfig>>,
    loaded: RwLock<HashMap<String, LoadedModel>>,
    loader: Option<Arc<dyn ModelLoader>>,
    load_lock: Mutex<()>,
}

impl ModelRegistry {
    pub async fn open(
        models_dir: impl Into<PathBuf>,
        loader: Option<Arc<dyn ModelLoader>>,
    ) -> Result<Self> {
        let models_dir = models_dir.into();
        fs::create_dir_all(&models_dir)
            .await
            .with_context(|| format!("Failed to create {}", models_dir.display()))?;

        let path = models_dir.join(CONFIG_FILE);
        let existing = if fs::metadata(&path).await.is_ok() {
            match read_configs(&path).await {
                Ok(configs) => {
                    logi(format!("Loaded {} model configurations", configs.len()));
                    configs
                }
                Err(e) => {
                    loge(format!("Failed to load model configs: {:#}", e));
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        let create_defaults = fs::metadata(&path).await.is_err();

        let registry = Self {
            models_dir,
            configs: RwLock::new(existing),
            loaded: RwLock::new(HashMap::new()),
            loader,
            load_lock: Mutex::new(()),
        };

        if create_defaults {
            let mut configs = registry.configs.write().await;
            *configs = default_model_configs();
            if let Err(e) = write_configs(&registry.config_path(), &configs).await {
                loge(format!("Failed to save model configs: {:#}", e));
            }
            drop(configs);
            logi("Created default model configurations");
        }

        Ok(registry)
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.models_dir.join(CONFIG_FILE)
    }

    pub fn is_available(&self) -> bool {
        self.loader.is_some()
    }

    pub async fn add_model(&self, model_id: &str, config: ModelConfig) -> Result<(), RegistryError> {
        let mut configs = self.configs.write().await;
        configs.insert(model_id.to_string(), config);
        write_configs(&self.config_path(), &configs)
            .await
            .map_err(|e| {
                loge(format!("Failed to save model configs: {:#}", e));
                RegistryError::Persist(format!("{:#}", e))
            })?;
        logi(format!("Added model configuration for {}", model_id));
        Ok(())
    }

    pub async fn config(&self, model_id: &str) -> Option<ModelConfig> {
        self.configs.read().await.get(model_id).cloned()
    }

    pub async fn is_loaded(&self, model_id: &str) -> bool {
        self.loaded.read().await.contains_key(model_id)
    }

    pub async fn available_models(&self) -> Vec<ModelSummary> {
        let configs = self.configs.read().await;
        let loaded = self.loaded.read().await;
        configs
            .iter()
            .map(|(id, cfg)| ModelSummary {
                id: id.clone(),
                name: cfg.display_name(id).to_string(),
                description: cfg.description.clone(),
                loaded: loaded.contains_key(id),
            })
            .collect()
    }

    pub async fn model_info(&self, model_id: &str) -> Option<ModelInfo> {
        let config = self.config(model_id).await?;
        Some(ModelInfo {
            id: model_id.to_string(),
            name: config.display_name(model_id).to_string(),
            description: config.description.clone(),
            loaded: self.is_loaded(model_id).await,
            config,
        })
    }

    /// Device a loaded model was placed on, as requested at load time.
    pub async fn loaded_device(&self, model_id: &str) -> Option<DevicePreference> {
        self.loaded.read().await.get(model_id).map(|m| m.device)
    }

    pub async fn load_model(
        &self,
        model_id: &str,
        device: DevicePreference,
    ) -> Result<LoadOutcome, RegistryError> {
        let loader = self.loader.as_ref().ok_or(RegistryError::Unavailable)?;

        if self.is_loaded(model_id).await {
            logi(format!("Model {} already loaded", model_id));
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        let config = self.config(model_id).await.ok_or_else(|| {
            loge(format!("Model {} not found in configurations", model_id));
            RegistryError::NotFound(model_id.to_string())
        })?;

        let _guard = self.load_lock.lock().await;
        if self.is_loaded(model_id).await {
            logi(format!("Model {} already loaded", model_id));
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        logi(format!("Loading model {} (device: {})...", model_id, device));
        match loader.load(model_id, &config, device).await {
            Ok(generator) => {
                logok(format!(
                    "Successfully loaded model {} ({})",
                    model_id,
                    generator.name()
                ));
                self.loaded
                    .write()
                    .await
                    .insert(model_id.to_string(), LoadedModel { generator, device });
                Ok(LoadOutcome::Loaded)
            }
            Err(e) => {
                loge(format!("Failed to load model {}: {:#}", model_id, e));
                Err(RegistryError::Load {
                    id: model_id.to_string(),
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    /// Drops the pipeline; its memory is released once in-flight generations finish.
    pub async fn unload_model(&self, model_id: &str) -> bool {
        let removed = self.loaded.write().await.remove(model_id).is_some();
        if removed {
            logi(format!("Unloaded model {}", model_id));
        }
        removed
    }

    pub async fn download_model(&self, model_id: &str) -> Result<(), RegistryError> {
        let loader = self.loader.as_ref().ok_or(RegistryError::Unavailable)?;
        let config = self
            .config(model_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(model_id.to_string()))?;

        logi(format!("Downloading model {}...", model_id));
        loader
            .prefetch(model_id, &config)
            .await
            .map_err(|e| RegistryError::Download {
                id: model_id.to_string(),
                reason: format!("{:#}", e),
            })
    }

    pub async fn generate_text(
        &self,
        model_id: &str,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String, RegistryError> {
        let generator = match self.loaded.read().await.get(model_id) {
            Some(model) => Arc::clone(&model.generator),
            None => {
                loge(format!("Model {} not loaded", model_id));
                return Err(RegistryError::NotLoaded(model_id.to_string()));
            }
        };
        let config = self
            .config(model_id)
            .await
            .unwrap_or_else(|| ModelConfig::named(model_id));
        let params = GenerationParams::resolve(&config, overrides);

        let owned_prompt = prompt.to_string();
        let joined =
            tokio::task::spawn_blocking(move || generator.generate(&owned_prompt, &params)).await;

        let raw = match joined {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                loge(format!("Text generation failed for {}: {:#}", model_id, e));
                return Err(RegistryError::Generation(format!("{:#}", e)));
            }
            Err(e) => {
                loge(format!("Text generation failed for {}: {}", model_id, e));
                return Err(RegistryError::Generation(e.to_string()));
            }
        };

        let text = strip_prompt(&raw, prompt);
        if text.is_empty() {
            return Err(RegistryError::NoText);
        }
        Ok(text)
    }
}

fn strip_prompt(generated: &str, prompt: &str) -> String {
    match generated.strip_prefix(prompt) {
        Some(rest) if !prompt.is_empty() => rest.trim().to_string(),
        _ => generated.trim().to_string(),
    }
}

async fn read_configs(path: &Path) -> Result<BTreeMap<String, ModelConfig>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))
}

async fn write_configs(path: &Path, configs: &BTreeMap<String, ModelConfig>) -> Result<()> {
    let json = serde_json::to_string_pretty(configs)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    })
    .await
    .context("config write task failed")?
}
