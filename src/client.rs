//! Small HTTP client for a running custom models server, used by the CLI demo.

use crate::api::API_PREFIX;
use crate::api::handlers::Envelope;
use crate::registry::ModelSummary;
use crate::script::ScriptRequest;
use crate::terms::TermsRequest;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct Message {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ScriptData {
    video_script: String,
}

#[derive(Debug, Deserialize)]
struct TermsData {
    video_terms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedData {
    generated_text: String,
}

/// Average, fastest and slowest of a series of request times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timings {
    pub average: Duration,
    pub fastest: Duration,
    pub slowest: Duration,
}

impl Timings {
    pub fn summarize(times: &[Duration]) -> Option<Self> {
        let fastest = times.iter().min().copied()?;
        let slowest = times.iter().max().copied()?;
        let total: Duration = times.iter().sum();
        Some(Self {
            average: total / times.len() as u32,
            fastest,
            slowest,
        })
    }
}

pub struct ApiClient {
    client: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base: format!("{}{}", base_url.trim_end_matches('/'), API_PREFIX),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request.send().await.context("request failed")?;
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let detail = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or_else(|| raw.chars().take(800).collect());
            anyhow::bail!("HTTP {}: {}", status.as_u16(), detail);
        }
        serde_json::from_str(&raw).with_context(|| format!("unexpected response body: {}", raw))
    }

    pub async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        self.send(self.client.get(self.url("/models"))).await
    }

    pub async fn load_model(&self, model_id: &str, device: &str) -> Result<String> {
        let body = json!({ "model_id": model_id, "device": device });
        let resp: Envelope<Message> = self
            .send(self.client.post(self.url(&format!("/models/{}/load", model_id))).json(&body))
            .await?;
        Ok(resp.data.message)
    }

    pub async fn unload_model(&self, model_id: &str) -> Result<String> {
        let resp: Envelope<Message> = self
            .send(self.client.delete(self.url(&format!("/models/{}/unload", model_id))))
            .await?;
        Ok(resp.data.message)
    }

    pub async fn generate_script(&self, req: &ScriptRequest) -> Result<String> {
        let resp: Envelope<ScriptData> = self
            .send(self.client.post(self.url("/scripts")).json(req))
            .await?;
        Ok(resp.data.video_script)
    }

    pub async fn generate_terms(&self, req: &TermsRequest) -> Result<Vec<String>> {
        let resp: Envelope<TermsData> = self
            .send(self.client.post(self.url("/terms")).json(req))
            .await?;
        Ok(resp.data.video_terms)
    }

    pub async fn generate_text(&self, model_id: &str, prompt: &str, max_new_tokens: usize) -> Result<String> {
        let body = json!({ "prompt": prompt, "max_new_tokens": max_new_tokens });
        let resp: Envelope<GeneratedData> = self
            .send(
                self.client
                    .post(self.url(&format!("/models/{}/generate", model_id)))
                    .json(&body),
            )
            .await?;
        Ok(resp.data.generated_text)
    }

    /// Runs one generation and reports how long the round trip took,
    /// whether or not it succeeded.
    pub async fn timed_generate(
        &self,
        model_id: &str,
        prompt: &str,
        max_new_tokens: usize,
    ) -> (Duration, Result<String>) {
        let start = Instant::now();
        let result = self.generate_text(model_id, prompt, max_new_tokens).await;
        (start.elapsed(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timings_cover_min_max_and_mean() {
        let times = [
            Duration::from_millis(300),
            Duration::from_millis(100),
            Duration::from_millis(200),
        ];
        let t = Timings::summarize(&times).unwrap();
        assert_eq!(t.fastest, Duration::from_millis(100));
        assert_eq!(t.slowest, Duration::from_millis(300));
        assert_eq!(t.average, Duration::from_millis(200));
    }

    #[test]
    fn no_runs_no_timings() {
        assert_eq!(Timings::summarize(&[]), None);
    }

    #[test]
    fn base_url_gets_the_api_prefix() {
        let client = ApiClient::with_client(Client::new(), "http://127.0.0.1:8080/");
        assert_eq!(client.url("/models"), "http://127.0.0.1:8080/custom-models/models");
    }
}
