use crate::registry::ModelConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Caller-supplied keyword arguments layered over a model's configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationOverrides {
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub do_sample: Option<bool>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
}

impl GenerationOverrides {
    /// Builds overrides from a loose JSON object, rejecting keys that are not
    /// generation parameters.
    pub fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(map))
            .context("invalid generation parameters")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_length: usize,
    pub max_new_tokens: Option<usize>,
    pub temperature: f64,
    pub do_sample: bool,
    pub top_k: Option<usize>,
    pub top_p: Option<f64>,
    pub repetition_penalty: f32,
    pub seed: u64,
    pub pad_token_id: Option<u32>,
}

impl GenerationParams {
    pub fn resolve(config: &ModelConfig, overrides: &GenerationOverrides) -> Self {
        Self {
            max_length: overrides.max_length.unwrap_or(config.max_length),
            max_new_tokens: overrides.max_new_tokens,
            temperature: overrides.temperature.unwrap_or(config.temperature),
            do_sample: overrides.do_sample.unwrap_or(config.do_sample),
            top_k: overrides.top_k,
            top_p: overrides.top_p,
            repetition_penalty: overrides.repetition_penalty.unwrap_or(1.0),
            seed: overrides.seed.unwrap_or_else(rand::random),
            pad_token_id: overrides.pad_token_id.or(config.pad_token_id),
        }
    }

    /// Number of tokens that may still be generated after a prompt of
    /// `prompt_tokens` tokens, never more than the model's context leaves room for.
    pub fn new_token_budget(&self, prompt_tokens: usize, context_length: usize) -> Result<usize> {
        if prompt_tokens >= context_length {
            anyhow::bail!(
                "prompt of {} tokens does not fit the model context of {}",
                prompt_tokens,
                context_length
            );
        }
        let room = context_length - prompt_tokens;

        let requested = match self.max_new_tokens {
            Some(n) => n,
            None => {
                let budget = self.max_length.saturating_sub(prompt_tokens);
                if budget == 0 {
                    anyhow::bail!(
                        "prompt exceeds max_length ({} tokens >= {})",
                        prompt_tokens,
                        self.max_length
                    );
                }
                budget
            }
        };
        Ok(requested.min(room))
    }

    pub fn is_greedy(&self) -> bool {
        !self.do_sample || self.temperature <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ModelConfig {
        ModelConfig::named("Test")
    }

    #[test]
    fn config_defaults_apply_without_overrides() {
        let params = GenerationParams::resolve(&config(), &GenerationOverrides::default());
        assert_eq!(params.max_length, 1000);
        assert_eq!(params.temperature, 0.7);
        assert!(params.do_sample);
        assert_eq!(params.repetition_penalty, 1.0);
        assert_eq!(params.pad_token_id, None);
    }

    #[test]
    fn overrides_win_over_config() {
        let mut cfg = config();
        cfg.pad_token_id = Some(50256);
        let overrides = GenerationOverrides {
            temperature: Some(0.2),
            do_sample: Some(false),
            seed: Some(7),
            ..Default::default()
        };
        let params = GenerationParams::resolve(&cfg, &overrides);
        assert_eq!(params.temperature, 0.2);
        assert!(!params.do_sample);
        assert!(params.is_greedy());
        assert_eq!(params.seed, 7);
        assert_eq!(params.pad_token_id, Some(50256));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let map = json!({"temperature": 0.5, "num_beams": 4});
        let map = map.as_object().cloned().unwrap();
        assert!(GenerationOverrides::from_json_map(map).is_err());
    }

    #[test]
    fn known_keys_parse() {
        let map = json!({"max_new_tokens": 64, "top_p": 0.9});
        let parsed = GenerationOverrides::from_json_map(map.as_object().cloned().unwrap()).unwrap();
        assert_eq!(parsed.max_new_tokens, Some(64));
        assert_eq!(parsed.top_p, Some(0.9));
    }

    #[test]
    fn budget_counts_prompt_against_max_length() {
        let params = GenerationParams::resolve(&config(), &GenerationOverrides::default());
        assert_eq!(params.new_token_budget(200, 32_768).unwrap(), 800);
        assert!(params.new_token_budget(1000, 32_768).is_err());

        let explicit = GenerationOverrides {
            max_new_tokens: Some(32),
            ..Default::default()
        };
        let params = GenerationParams::resolve(&config(), &explicit);
        assert_eq!(params.new_token_budget(5000, 8192).unwrap(), 32);
    }

    #[test]
    fn oversized_budgets_are_clamped_to_the_context() {
        let map = json!({"max_new_tokens": 1_000_000_000_000_000_000u64});
        let overrides = GenerationOverrides::from_json_map(map.as_object().cloned().unwrap()).unwrap();
        let params = GenerationParams::resolve(&config(), &overrides);
        assert_eq!(params.new_token_budget(12, 4096).unwrap(), 4084);

        let mut cfg = config();
        cfg.max_length = usize::MAX;
        let params = GenerationParams::resolve(&cfg, &GenerationOverrides::default());
        assert_eq!(params.new_token_budget(100, 2048).unwrap(), 1948);
    }

    #[test]
    fn prompt_longer_than_context_is_rejected() {
        let params = GenerationParams::resolve(&config(), &GenerationOverrides::default());
        assert!(params.new_token_budget(4096, 4096).is_err());
    }
}
