use crate::registry::RegistryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub const UNAVAILABLE_DETAIL: &str =
    "Custom models not available. Rebuild with the `local-models` feature: cargo build --features local-models";

/// Error body shaped as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    pub fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_DETAIL)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable => Self::unavailable(),
            RegistryError::NotFound(id) => Self::not_found(format!("Model {} not found", id)),
            RegistryError::Persist(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            RegistryError::Download { .. } => Self::new(StatusCode::BAD_GATEWAY, err.to_string()),
            RegistryError::Load { .. } => Self::bad_request(err.to_string()),
            RegistryError::NotLoaded(_) | RegistryError::NoText | RegistryError::Generation(_) => {
                Self::bad_request(format!("Error: {}", err))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failures_carry_error_prefix() {
        let e = ApiError::from(RegistryError::NotLoaded("gpt2".to_string()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.detail, "Error: Model gpt2 not loaded");

        let e = ApiError::from(RegistryError::NoText);
        assert_eq!(e.detail, "Error: No text generated");
    }

    #[test]
    fn status_codes_by_kind() {
        assert_eq!(
            ApiError::from(RegistryError::Unavailable).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(RegistryError::NotFound("x".into())).status,
            StatusCode::NOT_FOUND
        );
        let load = ApiError::from(RegistryError::Load {
            id: "x".into(),
            reason: "boom".into(),
        });
        assert_eq!(load.status, StatusCode::BAD_REQUEST);
        assert_eq!(load.detail, "Failed to load model x: boom");
        assert_eq!(
            ApiError::from(RegistryError::Persist("disk full".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
