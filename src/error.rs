//! HTTP error mapping.
//!
//! Every failure leaving the API is one of the [`ApiError`] variants. Bodies
//! follow the `{"detail": ...}` shape: a list of field errors for validation
//! failures, a fixed generic message otherwise. Upstream and internal detail
//! is logged, never returned.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::gateway::GatewayError;

/// Message returned with 503 responses.
pub const PROVIDER_UNAVAILABLE_DETAIL: &str = "Service temporarily unavailable";

/// Message returned with 500 responses.
pub const INTERNAL_ERROR_DETAIL: &str = "Internal server error";

/// One problem with a request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Path to the offending value, e.g. `["body", "query"]`.
    pub loc: Vec<String>,
    /// Human readable description.
    pub msg: String,
    /// Machine readable error kind, e.g. `string_too_long`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    /// A problem with a field of the JSON body.
    #[must_use]
    pub fn body(field: &str, msg: impl Into<String>, kind: &str) -> Self {
        Self {
            loc: vec!["body".to_string(), field.to_string()],
            msg: msg.into(),
            kind: kind.to_string(),
        }
    }
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body failed validation (422).
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    /// The completion provider could not produce a reply (503).
    #[error(transparent)]
    ProviderUnavailable(GatewayError),

    /// Unclassified failure (500).
    #[error("internal error: {0}")]
    Internal(String),

    /// No session with the requested ID (404).
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ProviderUnavailable(_) => Self::ProviderUnavailable(err),
            GatewayError::Internal(detail) => Self::Internal(detail),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let kind = match &rejection {
            JsonRejection::JsonDataError(_) => "json_invalid_data",
            JsonRejection::JsonSyntaxError(_) => "json_invalid",
            JsonRejection::MissingJsonContentType(_) => "content_type_invalid",
            _ => "body_invalid",
        };
        Self::Validation(vec![FieldError {
            loc: vec!["body".to_string()],
            msg: rejection.body_text(),
            kind: kind.to_string(),
        }])
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation(fields) => serde_json::json!({ "detail": fields }),
            // Already logged with session context by the gateway.
            Self::ProviderUnavailable(_) => {
                serde_json::json!({ "detail": PROVIDER_UNAVAILABLE_DETAIL })
            }
            Self::Internal(detail) => {
                tracing::error!(name: "server.request.failed", error = %detail, "Unexpected error");
                serde_json::json!({ "detail": INTERNAL_ERROR_DETAIL })
            }
            Self::SessionNotFound(_) => serde_json::json!({ "detail": "Session not found" }),
        };

        (status, Json(body)).into_response()
    }
}
