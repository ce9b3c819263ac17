//! Routes nested under `/api/gemini`.

pub mod chat;
pub mod generate;
pub mod media;
pub mod stream;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(generate::router())
        .merge(media::router())
        .merge(chat::router())
        .merge(stream::router())
}

#[derive(OpenApi)]
#[openapi(tags((name = "gemini", description = "Prompt relay to the Gemini API")))]
pub struct GeminiApi;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = GeminiApi::openapi();
    spec.merge(generate::GenerateApi::openapi());
    spec.merge(media::MediaApi::openapi());
    spec.merge(chat::ChatApi::openapi());
    spec.merge(stream::StreamApi::openapi());
    spec
}

/// The prompt, or a 400 with `error` when it is absent or blank.
///
/// Runs before any Gemini call.
pub(crate) fn require(value: Option<String>, error: &str) -> Result<String, ServerError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest(error.to_owned()))
}
