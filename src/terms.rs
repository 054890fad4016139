use crate::fallback::{clean_terms, fallback_terms};
use crate::generation::GenerationOverrides;
use crate::registry::{ModelConfig, ModelRegistry};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_SCRIPT_CHARS: usize = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsRequest {
    pub video_subject: String,
    #[serde(default)]
    pub video_script: String,
    #[serde(default = "default_amount")]
    pub amount: usize,
    #[serde(default)]
    pub model_id: Option<String>,
}

fn default_amount() -> usize {
    5
}

/// Stock-footage search terms for the video. Model terms come first; the
/// keyword templates fill whatever the model did not provide.
pub async fn generate_terms(registry: &ModelRegistry, model_id: &str, req: &TermsRequest) -> Vec<String> {
    let subject = req.video_subject.trim();
    let amount = req.amount;
    logi(format!(
        "Generating terms with custom model {} for subject: {}",
        model_id, subject
    ));
    if amount == 0 {
        return Vec::new();
    }

    let from_model = match model_terms(registry, model_id, subject, &req.video_script, amount).await {
        Ok(terms) => terms,
        Err(e) => {
            logw(format!("{:#}, using intelligent fallback for terms", e));
            Vec::new()
        }
    };

    if from_model.len() >= amount {
        logok(format!("Generated terms: {:?}", from_model));
        return from_model;
    }
    if !from_model.is_empty() {
        logw(format!(
            "Not enough terms generated ({} of {}), using intelligent fallback",
            from_model.len(),
            amount
        ));
    }

    let fill = fallback_terms(subject, amount.saturating_add(from_model.len()));
    let terms = clean_terms(from_model.into_iter().chain(fill), amount);
    logok(format!("Generated terms: {:?}", terms));
    terms
}

async fn model_terms(
    registry: &ModelRegistry,
    model_id: &str,
    subject: &str,
    script: &str,
    amount: usize,
) -> Result<Vec<String>> {
    if !registry.is_loaded(model_id).await {
        anyhow::bail!("Model {} not loaded", model_id);
    }
    let config = registry
        .config(model_id)
        .await
        .unwrap_or_else(|| ModelConfig::named(model_id));
    let prompt = config.render_prompt(&terms_prompt(subject, script, amount));

    let raw = registry
        .generate_text(model_id, &prompt, &GenerationOverrides::default())
        .await?;
    Ok(clean_terms(parse_terms(&raw)?, amount))
}

fn terms_prompt(subject: &str, script: &str, amount: usize) -> String {
    let script = trim_utf8_safe(script.trim(), MAX_SCRIPT_CHARS);
    format!(
        "Give {amount} search terms for finding stock videos about: {subject}\n\n\
         Rules:\n\
         - Answer with a JSON array of strings only, like [\"term 1\", \"term 2\"].\n\
         - Each term is 1 to 3 English words.\n\
         - Each term must relate to the subject.\n\n\
         Video script:\n{script}\n"
    )
}

fn trim_utf8_safe(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut cut = max_bytes;
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    &input[..cut]
}

fn json_array_regex() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| Regex::new(r"(?s)\[.*\]").context("failed to compile array regex"))
}

fn list_marker_regex() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| {
        Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").context("failed to compile list marker regex")
    })
}

/// Reads terms from model output: a JSON array when there is one, otherwise
/// a comma/newline/semicolon separated list.
pub(crate) fn parse_terms(raw: &str) -> Result<Vec<String>> {
    if let Some(m) = json_array_regex()?.find(raw) {
        if let Ok(terms) = serde_json::from_str::<Vec<String>>(m.as_str()) {
            return Ok(terms);
        }
    }

    let marker = list_marker_regex()?;
    let terms = raw
        .split([',', '\n', ';'])
        .map(|piece| {
            marker
                .replace(piece, "")
                .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.' | '[' | ']'))
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect();
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array_inside_chatter() {
        let raw = "Sure! Here you go:\n[\"Mountain Lake\", \"sunrise\", \"pine forest\"]\nEnjoy.";
        assert_eq!(
            parse_terms(raw).unwrap(),
            vec!["Mountain Lake", "sunrise", "pine forest"]
        );
    }

    #[test]
    fn parses_bulleted_and_numbered_lists() {
        let raw = "1. Mountain lake\n2) \"Sunrise\"\n- pine forest\n* misty morning.";
        assert_eq!(
            parse_terms(raw).unwrap(),
            vec!["Mountain lake", "Sunrise", "pine forest", "misty morning"]
        );
    }

    #[test]
    fn parses_comma_separated_and_broken_json() {
        let raw = "[lake, shore; waves";
        assert_eq!(parse_terms(raw).unwrap(), vec!["lake", "shore", "waves"]);
    }

    #[test]
    fn long_scripts_are_cut_on_char_boundaries() {
        let s = "é".repeat(2_000);
        let cut = trim_utf8_safe(&s, MAX_SCRIPT_CHARS);
        assert!(cut.len() <= MAX_SCRIPT_CHARS);
        assert_eq!(cut.chars().count(), 1_000);
    }

    #[test]
    fn request_defaults() {
        let req: TermsRequest = serde_json::from_str(r#"{"video_subject":"lakes"}"#).unwrap();
        assert_eq!(req.amount, 5);
        assert_eq!(req.video_script, "");
    }
}
