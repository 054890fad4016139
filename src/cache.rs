use crate::registry::ModelConfig;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn hub_dir(models_dir: &Path) -> PathBuf {
    models_dir.join("hub")
}

/// Directory the hub client caches a repository under.
pub fn repo_cache_dir(hub_dir: &Path, repo: &str) -> PathBuf {
    hub_dir.join(format!("models--{}", repo.replace('/', "--")))
}

/// Bytes of regular files below `dir`; snapshot symlinks are not followed so
/// blobs are counted once.
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Cached bytes for a model's weights and tokenizer repositories.
pub fn cached_size(hub_dir: &Path, model_id: &str, config: &ModelConfig) -> u64 {
    let weights_repo = config.gguf_repo.as_deref().unwrap_or(model_id);
    let tokenizer_repo = config.tokenizer_repo.as_deref().unwrap_or(model_id);

    let mut total = dir_size(&repo_cache_dir(hub_dir, weights_repo));
    if tokenizer_repo != weights_repo {
        total += dir_size(&repo_cache_dir(hub_dir, tokenizer_repo));
    }
    total
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn repo_dirs_follow_hub_layout() {
        let hub = Path::new("/tmp/hub");
        assert_eq!(
            repo_cache_dir(hub, "Qwen/Qwen2.5-0.5B-Instruct-GGUF"),
            PathBuf::from("/tmp/hub/models--Qwen--Qwen2.5-0.5B-Instruct-GGUF")
        );
    }

    #[test]
    fn sizes_sum_weights_and_tokenizer_repos() {
        let tmp = tempfile::tempdir().unwrap();
        let hub = tmp.path();
        let weights = repo_cache_dir(hub, "org/model-GGUF").join("blobs");
        let tok = repo_cache_dir(hub, "org/model").join("blobs");
        fs::create_dir_all(&weights).unwrap();
        fs::create_dir_all(&tok).unwrap();
        fs::write(weights.join("a"), vec![0u8; 1000]).unwrap();
        fs::write(tok.join("b"), vec![0u8; 24]).unwrap();

        let mut cfg = ModelConfig::named("m");
        cfg.gguf_repo = Some("org/model-GGUF".to_string());
        assert_eq!(cached_size(hub, "org/model", &cfg), 1024);
        assert_eq!(cached_size(hub, "org/missing", &ModelConfig::named("x")), 0);
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
