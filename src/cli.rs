use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use custom_models::cache;
use custom_models::client::{ApiClient, Timings};
use custom_models::config::Config;
use custom_models::defaults::recommended_models;
use custom_models::generation::GenerationOverrides;
use custom_models::inference::{self, DevicePreference};
use custom_models::init;
use custom_models::registry::{ModelConfig, ModelRegistry};
use custom_models::script::{self, ScriptRequest};
use custom_models::terms::{self, TermsRequest};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "custom-models-cli", about = "Manage and try local script-generation models")]
struct Cli {
    /// Path to config.json
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the models directory and catalogue, then download recommended models
    Setup {
        /// Only write directories and model_configs.json
        #[arg(long)]
        config_only: bool,
        #[arg(long)]
        skip_download: bool,
    },
    /// List configured models with their cache state
    List,
    /// Download a configured model's weights and tokenizer
    Download { model_id: String },
    /// Add or replace a model configuration
    Add {
        model_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        gguf_repo: Option<String>,
        #[arg(long)]
        gguf_file: Option<String>,
        #[arg(long)]
        tokenizer_repo: Option<String>,
        #[arg(long)]
        prompt_template: Option<String>,
        #[arg(long, default_value_t = 1000)]
        max_length: usize,
        #[arg(long, default_value_t = 0.7)]
        temperature: f64,
    },
    /// Generate a video script locally
    Script {
        subject: String,
        #[arg(long, default_value_t = 1)]
        paragraphs: usize,
        #[arg(long, default_value = "")]
        language: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Generate video search terms locally
    Terms {
        subject: String,
        #[arg(long, default_value = "")]
        script: String,
        #[arg(long, default_value_t = 5)]
        amount: usize,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Run a raw prompt through a model
    Generate {
        model_id: String,
        prompt: String,
        #[arg(long)]
        max_new_tokens: Option<usize>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Exercise a running server's endpoints
    Demo {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        base_url: String,
        #[arg(long)]
        model: Option<String>,
    },
}

async fn open_registry(cfg: &Config) -> Result<ModelRegistry> {
    init::ensure_directories(&cfg.models_dir).await?;
    let loader = inference::default_loader(&cfg.models_dir);
    ModelRegistry::open(&cfg.models_dir, loader).await
}

fn device_or_default(cfg: &Config, device: Option<String>) -> Result<DevicePreference> {
    device.unwrap_or_else(|| cfg.default_device.clone()).parse()
}

/// Loads the model for local generation; failure is reported but not fatal
/// because script and terms generation fall back to templates.
async fn try_load(registry: &ModelRegistry, model_id: &str, device: DevicePreference) {
    if let Err(e) = registry.load_model(model_id, device).await {
        eprintln!("[WARNING] {}", e);
    }
}

async fn setup(config_path: &Path, config_only: bool, skip_download: bool) -> Result<()> {
    if Config::ensure_model_keys(config_path).await? {
        println!("Updated {}", config_path.display());
    }
    let cfg = &Config::load(config_path).await?;
    let registry = open_registry(cfg).await?;
    println!("Models directory: {}", registry.models_dir().display());
    println!("Model catalogue:  {}", registry.config_path().display());

    if config_only || skip_download {
        return print_usage(cfg);
    }
    if !registry.is_available() {
        eprintln!("[WARNING] Built without the `local-models` feature; skipping downloads.");
        return print_usage(cfg);
    }

    for (model_id, size, priority) in recommended_models() {
        println!("Downloading {} ({}, {:?} priority)...", model_id, size, priority);
        match registry.download_model(model_id).await {
            Ok(()) => println!("  done"),
            Err(e) => eprintln!("  [ERROR] {}", e),
        }
    }
    print_usage(cfg)
}

fn print_usage(cfg: &Config) -> Result<()> {
    println!();
    println!("Set \"custom_model_id\" in config.json to choose the default model (now {}).", cfg.default_model_id);
    println!("Start the server with `custom-models`, then:");
    println!("  GET  /custom-models/models                 list models");
    println!("  POST /custom-models/models/{{model_id}}/load  load a model");
    println!("  POST /custom-models/scripts                generate a script");
    println!("  POST /custom-models/terms                  generate search terms");
    Ok(())
}

async fn list(cfg: &Config) -> Result<()> {
    let registry = open_registry(cfg).await?;
    let hub = cache::hub_dir(registry.models_dir());
    for model in registry.available_models().await {
        let cached = match registry.config(&model.id).await {
            Some(config) => cache::cached_size(&hub, &model.id, &config),
            None => 0,
        };
        let state = if cached > 0 {
            format!("cached {}", cache::format_size(cached))
        } else {
            "not downloaded".to_string()
        };
        println!("{:<40} {:<28} {}", model.id, model.name, state);
        if !model.description.is_empty() {
            println!("    {}", model.description);
        }
    }
    Ok(())
}

const PERF_PROMPT: &str = "Write a short paragraph about artificial intelligence";
const PERF_RUNS: usize = 3;

async fn demo_model_management(client: &ApiClient, model_id: &str) -> Result<()> {
    println!("Listing available models...");
    let models = client.list_models().await.context("Failed to list models")?;
    println!("  Found {} models:", models.len());
    for model in models {
        let state = if model.loaded { "loaded" } else { "not loaded" };
        println!("  {} ({}) - {}", model.name, model.id, state);
    }

    println!("\nLoading {}...", model_id);
    let msg = client
        .load_model(model_id, "auto")
        .await
        .context("Failed to load model")?;
    println!("  {}", msg);
    Ok(())
}

async fn demo_performance(client: &ApiClient, model_id: &str) {
    println!("\nPerformance");
    let mut times = Vec::with_capacity(PERF_RUNS);
    for i in 1..=PERF_RUNS {
        println!("  Generation {}/{}...", i, PERF_RUNS);
        let (elapsed, result) = client.timed_generate(model_id, PERF_PROMPT, 100).await;
        times.push(elapsed);
        match result {
            Ok(_) => println!("    completed in {:.2}s", elapsed.as_secs_f64()),
            Err(e) => eprintln!("    [ERROR] {:#}", e),
        }
    }
    if let Some(t) = Timings::summarize(&times) {
        println!("  Average generation time: {:.2}s", t.average.as_secs_f64());
        println!("  Fastest: {:.2}s", t.fastest.as_secs_f64());
        println!("  Slowest: {:.2}s", t.slowest.as_secs_f64());
    }
}

async fn demo(base_url: &str, model_id: &str) -> Result<()> {
    let client = ApiClient::new(base_url)?;

    if let Err(e) = demo_model_management(&client, model_id).await {
        eprintln!("  [ERROR] {:#}", e);
        anyhow::bail!("Model management failed, skipping other steps");
    }

    let cases = [
        ("The benefits of regular exercise", "en"),
        ("如何学习编程", "zh-CN"),
    ];
    for (subject, language) in cases {
        println!("\nScript for: {}", subject);
        let req = ScriptRequest {
            video_subject: subject.to_string(),
            language: language.to_string(),
            paragraph_number: 1,
            model_id: Some(model_id.to_string()),
        };
        match client.generate_script(&req).await {
            Ok(script) => println!("  ({} chars) {}", script.chars().count(), script),
            Err(e) => eprintln!("  [ERROR] {:#}", e),
        }
    }

    println!("\nTerms for: The benefits of regular exercise");
    let req = TermsRequest {
        video_subject: "The benefits of regular exercise".to_string(),
        video_script: "Exercise is one of the most important things you can do for your health.".to_string(),
        amount: 5,
        model_id: Some(model_id.to_string()),
    };
    match client.generate_terms(&req).await {
        Ok(terms) => terms.iter().for_each(|t| println!("  - {}", t)),
        Err(e) => eprintln!("  [ERROR] {:#}", e),
    }

    println!("\nFree-form generation...");
    match client
        .generate_text(model_id, "Explain quantum computing in simple terms", 120)
        .await
    {
        Ok(text) => println!("  {}", text),
        Err(e) => eprintln!("  [ERROR] {:#}", e),
    }

    demo_performance(&client, model_id).await;
    println!("\nDemo completed successfully!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).await?;

    match cli.command {
        Command::Setup {
            config_only,
            skip_download,
        } => setup(&cli.config, config_only, skip_download).await,
        Command::List => list(&cfg).await,
        Command::Download { model_id } => {
            let registry = open_registry(&cfg).await?;
            registry.download_model(&model_id).await?;
            println!("Downloaded {}", model_id);
            Ok(())
        }
        Command::Add {
            model_id,
            name,
            description,
            gguf_repo,
            gguf_file,
            tokenizer_repo,
            prompt_template,
            max_length,
            temperature,
        } => {
            let registry = open_registry(&cfg).await?;
            let mut config = ModelConfig::named(name);
            config.description = description;
            config.gguf_repo = gguf_repo;
            config.gguf_file = gguf_file;
            config.tokenizer_repo = tokenizer_repo;
            config.prompt_template = prompt_template;
            config.max_length = max_length;
            config.temperature = temperature;
            registry.add_model(&model_id, config).await?;
            println!("Configuration updated for model {}", model_id);
            Ok(())
        }
        Command::Script {
            subject,
            paragraphs,
            language,
            model,
            device,
        } => {
            let registry = open_registry(&cfg).await?;
            let model_id = model.unwrap_or_else(|| cfg.default_model_id.clone());
            try_load(&registry, &model_id, device_or_default(&cfg, device)?).await;
            let req = ScriptRequest {
                video_subject: subject,
                language,
                paragraph_number: paragraphs,
                model_id: Some(model_id.clone()),
            };
            println!("{}", script::generate_script(&registry, &model_id, &req).await);
            Ok(())
        }
        Command::Terms {
            subject,
            script,
            amount,
            model,
            device,
        } => {
            let registry = open_registry(&cfg).await?;
            let model_id = model.unwrap_or_else(|| cfg.default_model_id.clone());
            try_load(&registry, &model_id, device_or_default(&cfg, device)?).await;
            let req = TermsRequest {
                video_subject: subject,
                video_script: script,
                amount,
                model_id: Some(model_id.clone()),
            };
            for term in terms::generate_terms(&registry, &model_id, &req).await {
                println!("{}", term);
            }
            Ok(())
        }
        Command::Generate {
            model_id,
            prompt,
            max_new_tokens,
            temperature,
            device,
        } => {
            let registry = open_registry(&cfg).await?;
            registry
                .load_model(&model_id, device_or_default(&cfg, device)?)
                .await?;
            let overrides = GenerationOverrides {
                max_new_tokens,
                temperature,
                ..Default::default()
            };
            println!("{}", registry.generate_text(&model_id, &prompt, &overrides).await?);
            Ok(())
        }
        Command::Demo { base_url, model } => {
            let model_id = model.unwrap_or_else(|| cfg.default_model_id.clone());
            demo(&base_url, &model_id).await
        }
    }
}
