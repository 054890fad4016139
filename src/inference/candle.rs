//! GGUF text generation on candle, with weights pulled from the Hugging Face hub.

use super::{DevicePreference, ModelLoader, TextGenerator};
use crate::generation::GenerationParams;
use crate::registry::ModelConfig;
use crate::{logi, logok, logw};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::{quantized_llama, quantized_qwen2};
use hf_hub::api::sync::{Api, ApiBuilder};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

const TOKENIZER_FILE: &str = "tokenizer.json";
const STOP_TOKENS: &[&str] = &["</s>", "<|endoftext|>", "<|im_end|>", "<|eot_id|>"];
const REPEAT_LAST_N: usize = 64;
const DEFAULT_CONTEXT_LENGTH: usize = 2048;

#[derive(Debug, Clone)]
pub struct CandleLoader {
    cache_dir: PathBuf,
}

struct ModelFiles {
    weights: PathBuf,
    tokenizer: PathBuf,
}

impl CandleLoader {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn api(&self) -> Result<Api> {
        ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .with_progress(false)
            .build()
            .context("failed to initialise Hugging Face hub client")
    }

    fn fetch(&self, model_id: &str, config: &ModelConfig) -> Result<ModelFiles> {
        let api = self.api()?;

        let gguf_repo = config
            .gguf_repo
            .clone()
            .unwrap_or_else(|| model_id.to_string());
        let repo = api.model(gguf_repo.clone());

        let gguf_file = match &config.gguf_file {
            Some(file) => file.clone(),
            None => {
                let info = repo
                    .info()
                    .with_context(|| format!("failed to list files of {}", gguf_repo))?;
                pick_gguf_file(info.siblings.iter().map(|s| s.rfilename.as_str()))
                    .ok_or_else(|| anyhow!("no .gguf file found in {}", gguf_repo))?
            }
        };

        logi(format!("Fetching {} from {}", gguf_file, gguf_repo));
        let weights = repo
            .get(&gguf_file)
            .with_context(|| format!("failed to download {}/{}", gguf_repo, gguf_file))?;

        let tokenizer_repo = config
            .tokenizer_repo
            .clone()
            .unwrap_or_else(|| model_id.to_string());
        let tokenizer = api
            .model(tokenizer_repo.clone())
            .get(TOKENIZER_FILE)
            .with_context(|| format!("failed to download {}/{}", tokenizer_repo, TOKENIZER_FILE))?;

        Ok(ModelFiles { weights, tokenizer })
    }
}

#[async_trait]
impl ModelLoader for CandleLoader {
    async fn load(
        &self,
        model_id: &str,
        config: &ModelConfig,
        device: DevicePreference,
    ) -> Result<Arc<dyn TextGenerator>> {
        let loader = self.clone();
        let id = model_id.to_string();
        let config = config.clone();

        let generator = tokio::task::spawn_blocking(move || -> Result<CandleGenerator> {
            let files = loader.fetch(&id, &config)?;
            let device = resolve_device(device)?;
            CandleGenerator::load(&id, &files, device)
        })
        .await
        .context("model loading task failed")??;

        Ok(Arc::new(generator))
    }

    async fn prefetch(&self, model_id: &str, config: &ModelConfig) -> Result<()> {
        let loader = self.clone();
        let id = model_id.to_string();
        let config = config.clone();

        let files = tokio::task::spawn_blocking(move || loader.fetch(&id, &config))
            .await
            .context("download task failed")??;
        logok(format!(
            "Cached {} and {}",
            files.weights.display(),
            files.tokenizer.display()
        ));
        Ok(())
    }
}

fn resolve_device(pref: DevicePreference) -> Result<Device> {
    match pref {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Cuda => Device::new_cuda(0).context("CUDA device not available"),
        DevicePreference::Metal => Device::new_metal(0).context("Metal device not available"),
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                match Device::new_cuda(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => logw(format!("CUDA detection failed: {}. Trying next device.", e)),
                }
            }
            if candle_core::utils::metal_is_available() {
                match Device::new_metal(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => logw(format!("Metal detection failed: {}. Using CPU.", e)),
                }
            }
            Ok(Device::Cpu)
        }
    }
}

/// Chooses a weights file from a repository listing, preferring Q4_K_M.
pub(crate) fn pick_gguf_file<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut ggufs: Vec<&str> = names
        .filter(|n| n.to_ascii_lowercase().ends_with(".gguf"))
        .collect();
    ggufs.sort_unstable();
    ggufs
        .iter()
        .find(|n| n.to_ascii_lowercase().contains("q4_k_m"))
        .or_else(|| ggufs.first())
        .map(|n| n.to_string())
}

enum Weights {
    Llama(quantized_llama::ModelWeights),
    Qwen2(quantized_qwen2::ModelWeights),
}

impl Weights {
    fn forward(&mut self, input: &Tensor, pos: usize) -> candle_core::Result<Tensor> {
        match self {
            Self::Llama(m) => m.forward(input, pos),
            Self::Qwen2(m) => m.forward(input, pos),
        }
    }
}

pub struct CandleGenerator {
    model_id: String,
    weights: Mutex<Weights>,
    tokenizer: Tokenizer,
    device: Device,
    stop_tokens: Vec<u32>,
    context_length: usize,
}

impl CandleGenerator {
    fn load(model_id: &str, files: &ModelFiles, device: Device) -> Result<Self> {
        logi(format!("Loading weights from {}", files.weights.display()));
        let mut file = std::fs::File::open(&files.weights)
            .with_context(|| format!("failed to open {}", files.weights.display()))?;
        let content = gguf_file::Content::read(&mut file)
            .with_context(|| format!("failed to read GGUF header of {}", files.weights.display()))?;

        let arch = content
            .metadata
            .get("general.architecture")
            .and_then(|v| v.to_string().ok())
            .cloned()
            .unwrap_or_else(|| "llama".to_string());
        let eos = content
            .metadata
            .get("tokenizer.ggml.eos_token_id")
            .and_then(|v| v.to_u32().ok());
        let declared_context = content
            .metadata
            .get(&format!("{}.context_length", arch))
            .and_then(|v| {
                v.to_u32()
                    .map(|n| n as usize)
                    .or_else(|_| v.to_u64().map(|n| n as usize))
                    .ok()
            });
        let context_length = context_limit(&arch, declared_context);

        let weights = match arch.as_str() {
            "llama" => Weights::Llama(
                quantized_llama::ModelWeights::from_gguf(content, &mut file, &device)
                    .context("failed to build llama weights")?,
            ),
            "qwen2" => Weights::Qwen2(
                quantized_qwen2::ModelWeights::from_gguf(content, &mut file, &device)
                    .context("failed to build qwen2 weights")?,
            ),
            other => anyhow::bail!(
                "unsupported GGUF architecture '{}' (supported: llama, qwen2)",
                other
            ),
        };

        let tokenizer = load_tokenizer(&files.tokenizer)?;
        let mut stop_tokens: Vec<u32> = STOP_TOKENS
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        if let Some(eos) = eos {
            stop_tokens.push(eos);
        }

        logok(format!(
            "{} ready ({} weights on {:?}, context {}, {} stop tokens)",
            model_id,
            arch,
            device,
            context_length,
            stop_tokens.len()
        ));

        Ok(Self {
            model_id: model_id.to_string(),
            weights: Mutex::new(weights),
            tokenizer,
            device,
            stop_tokens,
            context_length,
        })
    }
}

/// Tokens a model can attend to. quantized llama precomputes rotary tables
/// for `MAX_SEQ_LEN` positions only.
fn context_limit(arch: &str, declared: Option<usize>) -> usize {
    let declared = declared.filter(|&n| n > 0).unwrap_or(DEFAULT_CONTEXT_LENGTH);
    match arch {
        "llama" => declared.min(quantized_llama::MAX_SEQ_LEN),
        _ => declared,
    }
}

fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("failed to load tokenizer {}", path.display()))
}

fn sampling(params: &GenerationParams) -> Sampling {
    if params.is_greedy() {
        return Sampling::ArgMax;
    }
    let temperature = params.temperature;
    match (params.top_k, params.top_p) {
        (None, None) => Sampling::All { temperature },
        (Some(k), None) => Sampling::TopK { k, temperature },
        (None, Some(p)) => Sampling::TopP { p, temperature },
        (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
    }
}

impl TextGenerator for CandleGenerator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(anyhow::Error::msg)
            .context("failed to encode prompt")?;
        let prompt_tokens = encoding.get_ids().to_vec();
        if prompt_tokens.is_empty() {
            anyhow::bail!("prompt encoded to zero tokens");
        }
        let budget = params.new_token_budget(prompt_tokens.len(), self.context_length)?;

        let mut stop = self.stop_tokens.clone();
        if let Some(pad) = params.pad_token_id {
            stop.push(pad);
        }

        let mut sampler = LogitsProcessor::from_sampling(params.seed, sampling(params));
        let mut weights = self
            .weights
            .lock()
            .map_err(|_| anyhow!("model {} is unusable after a failed generation", self.model_id))?;

        let mut history = prompt_tokens.clone();
        let mut generated = Vec::new();
        let mut input_ids = prompt_tokens;
        let mut pos = 0;

        for _ in 0..budget {
            let input = Tensor::new(input_ids.as_slice(), &self.device)?.unsqueeze(0)?;
            let logits = weights
                .forward(&input, pos)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;
            pos += input_ids.len();

            let logits = if params.repetition_penalty != 1.0 {
                let start = history.len().saturating_sub(REPEAT_LAST_N);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    params.repetition_penalty,
                    &history[start..],
                )?
            } else {
                logits
            };

            let next = sampler.sample(&logits)?;
            if stop.contains(&next) {
                break;
            }
            history.push(next);
            generated.push(next);
            input_ids = vec![next];
        }
        drop(weights);

        self.tokenizer
            .decode(&generated, true)
            .map_err(anyhow::Error::msg)
            .context("failed to decode generated tokens")
    }

    fn name(&self) -> &str {
        "candle-gguf"
    }
}
