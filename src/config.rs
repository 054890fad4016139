use crate::logi;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(rename = "custom_model_id")]
    #[serde(default = "default_model_id")]
    pub default_model_id: String,
    #[serde(rename = "custom_model_device")]
    #[serde(default = "default_device")]
    pub default_device: String,
    #[serde(default)]
    pub preload_default_model: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_id() -> String {
    "Qwen/Qwen2.5-0.5B-Instruct".to_string()
}

fn default_device() -> String {
    "auto".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            models_dir: default_models_dir(),
            default_model_id: default_model_id(),
            default_device: default_device(),
            preload_default_model: false,
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if fs::metadata(path).await.is_err() {
            logi(format!("{} not found, using default settings", path.display()));
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        if config.default_model_id.trim().is_empty() {
            anyhow::bail!("config.json: custom_model_id is empty");
        }

        Ok(config)
    }

    /// Makes sure `path` names the custom model and device: writes a default
    /// config when the file is missing, otherwise adds whichever of the two
    /// keys is absent. Other keys are left untouched. Returns whether the file
    /// was written.
    pub async fn ensure_model_keys<P: AsRef<Path>>(path: P) -> Result<bool> {
        let path = path.as_ref();
        if fs::metadata(path).await.is_err() {
            let json = serde_json::to_string_pretty(&Self::default())?;
            fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
            logi(format!("Created {} with default settings", path.display()));
            return Ok(true);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        let mut changed = false;
        for (key, value) in [
            ("custom_model_id", default_model_id()),
            ("custom_model_device", default_device()),
        ] {
            if !doc.contains_key(key) {
                doc.insert(key.to_string(), serde_json::Value::String(value));
                logi(format!("Added {} to {}", key, path.display()));
                changed = true;
            }
        }
        if changed {
            fs::write(path, serde_json::to_string_pretty(&doc)?)
                .await
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
        }
        Ok(changed)
    }
}
