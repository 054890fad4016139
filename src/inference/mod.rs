//! Local inference seam: the registry only sees these traits, the candle
//! backend lives behind the `local-models` feature.

use crate::generation::GenerationParams;
use crate::registry::ModelConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "local-models")]
pub mod candle;

/// A loaded text-generation pipeline.
///
/// `generate` is blocking and may run for seconds; callers move it onto a
/// blocking thread.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(
        &self,
        model_id: &str,
        config: &ModelConfig,
        device: DevicePreference,
    ) -> Result<Arc<dyn TextGenerator>>;

    /// Fetches weights and tokenizer into the local cache without loading them.
    async fn prefetch(&self, model_id: &str, config: &ModelConfig) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" | "mps" => Ok(Self::Metal),
            other => anyhow::bail!("unknown device '{}' (expected auto, cpu, cuda or metal)", other),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Metal => "metal",
        };
        f.write_str(s)
    }
}

/// The loader compiled into this binary, if any.
#[cfg(feature = "local-models")]
pub fn default_loader(models_dir: &Path) -> Option<Arc<dyn ModelLoader>> {
    Some(Arc::new(candle::CandleLoader::new(crate::cache::hub_dir(models_dir))))
}

#[cfg(not(feature = "local-models"))]
pub fn default_loader(_models_dir: &Path) -> Option<Arc<dyn ModelLoader>> {
    None
}
