use super::AppState;
use super::error::ApiError;
use crate::generation::GenerationOverrides;
use crate::inference::DevicePreference;
use crate::registry::{ModelConfig, ModelInfo, ModelSummary};
use crate::script::{self, ScriptRequest};
use crate::terms::{self, TermsRequest};
use crate::logw;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

const ACTIONS: &[&str] = &["load", "unload", "config", "generate"];

/// Success envelope: `{"status": 200, "data": ...}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: u16,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope { status: 200, data }).into_response()
}

fn message(text: String) -> Response {
    ok(json!({ "message": text }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadModelRequest {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
}

/// Splits `org/name/load` into the model id and a trailing action, if any.
pub(crate) fn split_action(path: &str) -> (&str, Option<&str>) {
    let path = path.trim_matches('/');
    match path.rsplit_once('/') {
        Some((id, action)) if ACTIONS.contains(&action) && !id.is_empty() => (id, Some(action)),
        _ => (path, None),
    }
}

fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::unprocessable(format!("Invalid request body: {}", e)))
}

pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelSummary>> {
    Json(state.registry.available_models().await)
}

pub async fn model_get(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<ModelInfo>, ApiError> {
    let id = path.trim_matches('/');
    state
        .registry
        .model_info(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Model not found"))
}

pub async fn model_post(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    match split_action(&path) {
        (id, Some("load")) => load_model(&state, id, &body).await,
        (id, Some("config")) => update_model_config(&state, id, &body).await,
        (id, Some("generate")) => generate_text(&state, id, &body).await,
        _ => Err(ApiError::not_found("Not Found")),
    }
}

pub async fn model_delete(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    match split_action(&path) {
        (id, Some("unload")) => {
            state.registry.unload_model(id).await;
            Ok(message(format!("Model {} unloaded successfully", id)))
        }
        _ => Err(ApiError::not_found("Not Found")),
    }
}

async fn load_model(state: &AppState, id: &str, body: &Bytes) -> Result<Response, ApiError> {
    let req: LoadModelRequest = parse_body(body)?;
    if let Some(body_id) = req.model_id.as_deref() {
        if body_id != id {
            logw(format!(
                "Load request body names {} but path names {}; using the path",
                body_id, id
            ));
        }
    }

    let device = match req.device.as_deref() {
        Some(name) => name
            .parse::<DevicePreference>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => state.default_device,
    };

    state.registry.load_model(id, device).await?;
    Ok(message(format!("Model {} loaded successfully", id)))
}

async fn update_model_config(state: &AppState, id: &str, body: &Bytes) -> Result<Response, ApiError> {
    let config: ModelConfig = serde_json::from_slice(body)
        .map_err(|e| ApiError::unprocessable(format!("Invalid model config: {}", e)))?;
    state.registry.add_model(id, config).await?;
    Ok(message(format!("Configuration updated for model {}", id)))
}

async fn generate_text(state: &AppState, id: &str, body: &Bytes) -> Result<Response, ApiError> {
    let mut params: serde_json::Map<String, serde_json::Value> = parse_body(body)?;
    let prompt = params
        .remove("prompt")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    if prompt.is_empty() {
        return Err(ApiError::bad_request("Prompt is required"));
    }

    let overrides = GenerationOverrides::from_json_map(params)
        .map_err(|e| ApiError::bad_request(format!("Error: {:#}", e)))?;
    let text = state.registry.generate_text(id, &prompt, &overrides).await?;
    Ok(ok(json!({ "generated_text": text })))
}

pub async fn generate_script(
    State(state): State<AppState>,
    body: Result<Json<ScriptRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::unprocessable(e.body_text()))?;
    let model_id = req
        .model_id
        .clone()
        .unwrap_or_else(|| state.default_model_id.clone());
    let script = script::generate_script(&state.registry, &model_id, &req).await;
    Ok(ok(json!({ "video_script": script })))
}

pub async fn generate_terms(
    State(state): State<AppState>,
    body: Result<Json<TermsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::unprocessable(e.body_text()))?;
    let model_id = req
        .model_id
        .clone()
        .unwrap_or_else(|| state.default_model_id.clone());
    let terms = terms::generate_terms(&state.registry, &model_id, &req).await;
    Ok(ok(json!({ "video_terms": terms })))
}
