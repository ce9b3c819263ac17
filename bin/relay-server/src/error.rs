//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body of the form
//! `{"error": ...}` with a status code chosen by the error's class.
//!
//! Database and internal errors are logged with full detail, but only a
//! generic message is returned so SQL or file paths never reach clients.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_gemini::{ErrorKind, GeminiError};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

/// All errors that can occur in the relay-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the Gemini adapter; the status follows [`ErrorKind`].
    #[error(transparent)]
    Gemini(#[from] GeminiError),

    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the configured upload limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Field-level validation failed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Gemini(e) => match e.kind() {
                ErrorKind::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            },
            ServerError::Database(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client-facing `error` value.
    pub fn client_message(&self) -> Value {
        match self {
            ServerError::NotFound(m) | ServerError::BadRequest(m) | ServerError::PayloadTooLarge(m) => {
                Value::String(m.clone())
            }
            ServerError::Validation(errors) => json!(field_messages(errors)),
            ServerError::Gemini(e) => Value::String(e.to_string()),
            ServerError::Database(_) | ServerError::Internal(_) => {
                Value::String("internal server error".to_owned())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ServerError::Database(e) => error!(error = %e, "database error"),
            ServerError::Internal(m) => error!(message = %m, "internal server error"),
            ServerError::Gemini(e) if status.is_server_error() => {
                error!(error = %e, kind = ?e.kind(), "Gemini request failed")
            }
            other => warn!(status = status.as_u16(), error = %other, "request rejected"),
        }
        (status, Json(json!({ "error": self.client_message() }))).into_response()
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ServerError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(e.body_text())
        } else {
            ServerError::BadRequest(format!("failed to read multipart body: {}", e.body_text()))
        }
    }
}

/// `{field: [message, ...]}` with a readable fallback when a rule has no message.
fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("The {field} field is invalid ({}).", e.code),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}
