use crate::registry::ModelConfig;
use std::collections::BTreeMap;

pub const CHATML_TEMPLATE: &str = "<|im_start|>user\n{prompt}<|im_end|>\n<|im_start|>assistant\n";
pub const ZEPHYR_TEMPLATE: &str = "<|user|>\n{prompt}</s>\n<|assistant|>\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High,
    Medium,
    Low,
}

struct CatalogueEntry {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    gguf_repo: &'static str,
    gguf_file: &'static str,
    template: &'static str,
    use_case: &'static str,
    size: &'static str,
    temperature: f64,
    priority: Priority,
}

const CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        id: "Qwen/Qwen2.5-0.5B-Instruct",
        name: "Qwen2.5 0.5B Instruct",
        description: "Small instruction model, best balance of quality and speed (RECOMMENDED)",
        gguf_repo: "Qwen/Qwen2.5-0.5B-Instruct-GGUF",
        gguf_file: "qwen2.5-0.5b-instruct-q4_k_m.gguf",
        template: CHATML_TEMPLATE,
        use_case: "text_generation",
        size: "~400MB",
        temperature: 0.7,
        priority: Priority::High,
    },
    CatalogueEntry {
        id: "HuggingFaceTB/SmolLM2-360M-Instruct",
        name: "SmolLM2 360M Instruct",
        description: "Lightweight model for testing and quick generation",
        gguf_repo: "HuggingFaceTB/SmolLM2-360M-Instruct-GGUF",
        gguf_file: "smollm2-360m-instruct-q8_0.gguf",
        template: CHATML_TEMPLATE,
        use_case: "text_generation",
        size: "~390MB",
        temperature: 0.7,
        priority: Priority::Medium,
    },
    CatalogueEntry {
        id: "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
        name: "TinyLlama 1.1B Chat",
        description: "Conversational model tuned for chat (1.1B parameters)",
        gguf_repo: "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF",
        gguf_file: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
        template: ZEPHYR_TEMPLATE,
        use_case: "conversational",
        size: "~670MB",
        temperature: 0.7,
        priority: Priority::Medium,
    },
    CatalogueEntry {
        id: "Qwen/Qwen2.5-1.5B-Instruct",
        name: "Qwen2.5 1.5B Instruct",
        description: "Medium instruction model for better scripts",
        gguf_repo: "Qwen/Qwen2.5-1.5B-Instruct-GGUF",
        gguf_file: "qwen2.5-1.5b-instruct-q4_k_m.gguf",
        template: CHATML_TEMPLATE,
        use_case: "text_generation",
        size: "~1.1GB",
        temperature: 0.8,
        priority: Priority::Low,
    },
    CatalogueEntry {
        id: "HuggingFaceTB/SmolLM2-1.7B-Instruct",
        name: "SmolLM2 1.7B Instruct",
        description: "Larger SmolLM2 model for creative content",
        gguf_repo: "HuggingFaceTB/SmolLM2-1.7B-Instruct-GGUF",
        gguf_file: "smollm2-1.7b-instruct-q4_k_m.gguf",
        template: CHATML_TEMPLATE,
        use_case: "text_generation",
        size: "~1.1GB",
        temperature: 0.7,
        priority: Priority::Low,
    },
    CatalogueEntry {
        id: "Qwen/Qwen2.5-3B-Instruct",
        name: "Qwen2.5 3B Instruct",
        description: "Largest default model, needs a GPU for reasonable speed",
        gguf_repo: "Qwen/Qwen2.5-3B-Instruct-GGUF",
        gguf_file: "qwen2.5-3b-instruct-q4_k_m.gguf",
        template: CHATML_TEMPLATE,
        use_case: "text_generation",
        size: "~2.1GB",
        temperature: 0.7,
        priority: Priority::Low,
    },
];

fn to_config(entry: &CatalogueEntry) -> ModelConfig {
    let mut cfg = ModelConfig::named(entry.name);
    cfg.description = entry.description.to_string();
    cfg.temperature = entry.temperature;
    cfg.use_case = Some(entry.use_case.to_string());
    cfg.size = Some(entry.size.to_string());
    cfg.gguf_repo = Some(entry.gguf_repo.to_string());
    cfg.gguf_file = Some(entry.gguf_file.to_string());
    cfg.prompt_template = Some(entry.template.to_string());
    cfg
}

pub fn default_model_configs() -> BTreeMap<String, ModelConfig> {
    CATALOGUE
        .iter()
        .map(|entry| (entry.id.to_string(), to_config(entry)))
        .collect()
}

/// Models the setup command downloads, highest priority first.
pub fn recommended_models() -> Vec<(&'static str, &'static str, Priority)> {
    let mut out: Vec<_> = CATALOGUE
        .iter()
        .filter(|e| e.priority != Priority::Low)
        .map(|e| (e.id, e.size, e.priority))
        .collect();
    out.sort_by_key(|(_, _, p)| *p);
    out
}
