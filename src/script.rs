use crate::fallback::fallback_script;
use crate::generation::GenerationOverrides;
use crate::registry::{ModelConfig, ModelRegistry};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MIN_SCRIPT_CHARS: usize = 100;
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub video_subject: String,
    #[serde(default)]
    pub language: String,
    #[serde(default = "default_paragraph_number")]
    pub paragraph_number: usize,
    #[serde(default)]
    pub model_id: Option<String>,
}

fn default_paragraph_number() -> usize {
    1
}

/// Writes a narration script with the given model, or with the templates when
/// the model is unavailable or its answer is unusable. Never fails.
pub async fn generate_script(registry: &ModelRegistry, model_id: &str, req: &ScriptRequest) -> String {
    let subject = req.video_subject.trim();
    let paragraphs = req.paragraph_number.max(1);
    logi(format!(
        "Generating script with custom model {} for subject: {}",
        model_id, subject
    ));

    match model_script(registry, model_id, subject, &req.language, paragraphs).await {
        Ok(script) => {
            logok(format!("Model script: {}...", preview(&script)));
            return script;
        }
        Err(e) => logw(format!("{:#}, using intelligent fallback", e)),
    }

    let script = fallback_script(subject, paragraphs);
    logok(format!("Using intelligent fallback script: {}...", preview(&script)));
    script
}

async fn model_script(
    registry: &ModelRegistry,
    model_id: &str,
    subject: &str,
    language: &str,
    paragraphs: usize,
) -> Result<String> {
    if !registry.is_loaded(model_id).await {
        anyhow::bail!("Model {} not loaded", model_id);
    }
    let config = registry
        .config(model_id)
        .await
        .unwrap_or_else(|| ModelConfig::named(model_id));
    let prompt = config.render_prompt(&script_prompt(subject, language, paragraphs));

    let raw = registry
        .generate_text(model_id, &prompt, &GenerationOverrides::default())
        .await?;
    let kept: Vec<String> = clean_script(&raw)?.into_iter().take(paragraphs).collect();
    let script = kept.join("\n\n");

    if !is_usable_script(&script) {
        anyhow::bail!("Model generated poor response");
    }
    Ok(script)
}

fn script_prompt(subject: &str, language: &str, paragraphs: usize) -> String {
    let mut prompt = format!(
        "Write the narration for a short video about: {subject}\n\n\
         Rules:\n\
         - Exactly {paragraphs} paragraph(s), separated by a blank line.\n\
         - Plain text only: no title, no markdown, no speaker labels.\n\
         - Get straight to the point; do not greet the viewer.\n\
         - Never mention these instructions or the script itself.\n"
    );
    if language.trim().is_empty() {
        prompt.push_str("- Write in the same language as the subject.\n");
    } else {
        prompt.push_str(&format!("- Write in this language: {}.\n", language.trim()));
    }
    prompt
}

fn bracketed_regex() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| {
        Regex::new(r"\[[^\]]*\]|\([^)]*\)").context("failed to compile bracket regex")
    })
}

fn speaker_label_regex() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| {
        Regex::new(r"(?i)^(voice\s*-?over|narrator|narration|script|paragraph\s*\d*)\s*:\s*")
            .context("failed to compile speaker label regex")
    })
}

fn paragraph_break_regex() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| {
        Regex::new(r"\n\s*\n").context("failed to compile paragraph regex")
    })
}

/// Strips markdown, bracketed asides and speaker labels; returns the
/// non-empty paragraphs with their lines joined.
pub(crate) fn clean_script(raw: &str) -> Result<Vec<String>> {
    let text = raw.replace("\r\n", "\n").replace(['*', '#'], "");
    let text = bracketed_regex()?.replace_all(&text, "");

    let labels = speaker_label_regex()?;
    let mut out = Vec::new();
    for block in paragraph_break_regex()?.split(&text) {
        let joined = block
            .lines()
            .map(|line| labels.replace(line.trim(), "").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            out.push(joined);
        }
    }
    Ok(out)
}

fn is_usable_script(script: &str) -> bool {
    let has_sentence = script
        .chars()
        .any(|c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'));
    !script.starts_with("Error:") && script.chars().count() >= MIN_SCRIPT_CHARS && has_sentence
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_removes_markdown_and_labels() {
        let raw = "## Title\n**Narrator:** The forest wakes (softly) at dawn.\nBirds sing [music].\n\n\nVoiceover: A second paragraph.";
        let paragraphs = clean_script(raw).unwrap();
        assert_eq!(
            paragraphs,
            vec![
                "Title The forest wakes  at dawn. Birds sing .".to_string(),
                "A second paragraph.".to_string(),
            ]
        );
    }

    #[test]
    fn blank_output_has_no_paragraphs() {
        assert!(clean_script("  \n\n **  ").unwrap().is_empty());
    }

    #[test]
    fn usability_needs_length_and_a_sentence() {
        assert!(!is_usable_script("Too short."));
        let long_without_stop = "word ".repeat(40);
        assert!(!is_usable_script(&long_without_stop));
        let good = format!("{}end.", "A fine sentence about lakes ".repeat(5));
        assert!(is_usable_script(&good));
        assert!(!is_usable_script(&format!("Error: {}", good)));
    }

    #[test]
    fn prompt_mentions_language_when_given() {
        let p = script_prompt("lakes", "zh-CN", 2);
        assert!(p.contains("lakes"));
        assert!(p.contains("Exactly 2 paragraph(s)"));
        assert!(p.contains("zh-CN"));
        assert!(script_prompt("lakes", "", 1).contains("same language as the subject"));
    }

    #[test]
    fn request_defaults() {
        let req: ScriptRequest = serde_json::from_str(r#"{"video_subject":"lakes"}"#).unwrap();
        assert_eq!(req.paragraph_number, 1);
        assert_eq!(req.language, "");
        assert!(req.model_id.is_none());
    }
}
