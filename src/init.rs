use crate::logi;
use anyhow::Result;
use std::path::Path;
use tokio::fs;

const MODEL_SUBDIRS: &[&str] = &["text_generation", "conversational", "summarization"];

pub async fn ensure_directories(models_dir: &Path) -> Result<()> {
    if !models_dir.exists() {
        fs::create_dir_all(models_dir).await?;
        logi(format!("Created directory: {}", models_dir.display()));
    }
    for sub in MODEL_SUBDIRS {
        let dir = models_dir.join(sub);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub fn local_models_available() -> bool {
    cfg!(feature = "local-models")
}
