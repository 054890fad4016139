//! HTTP surface of the registry, mounted under `/custom-models`.

pub mod error;
pub mod handlers;

use crate::inference::DevicePreference;
use crate::logi;
use crate::registry::ModelRegistry;
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use error::ApiError;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const API_PREFIX: &str = "/custom-models";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub default_model_id: String,
    pub default_device: DevicePreference,
}

async fn require_available(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.registry.is_available() {
        return ApiError::unavailable().into_response();
    }
    next.run(request).await
}

pub fn create_router(state: AppState) -> Router {
    let custom_models = Router::new()
        .route("/models", get(handlers::list_models))
        .route(
            "/models/*path",
            get(handlers::model_get)
                .post(handlers::model_post)
                .delete(handlers::model_delete),
        )
        .route("/scripts", post(handlers::generate_script))
        .route("/terms", post(handlers::generate_terms))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_available))
        .with_state(state);

    Router::new()
        .nest(API_PREFIX, custom_models)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(listen_addr: &str, state: AppState) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    logi(format!(
        "Custom models API listening on http://{}{}",
        listener.local_addr()?,
        API_PREFIX
    ));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        logi("Shutdown requested");
    }
}
