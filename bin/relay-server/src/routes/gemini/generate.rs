//! Single-prompt JSON endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use relay_gemini::ResponseSchema;
use tracing::{error, info};
use utoipa::OpenApi;

use super::require;
use crate::error::ServerError;
use crate::extract::ApiJson;
use crate::schemas::gemini::{
    ConfiguredGenerationResponse, MessageRequest, StructuredRequest, StructuredResponse,
    TextResponse, TokenCountResponse,
};
use crate::state::AppState;

const MESSAGE_REQUIRED: &str = "Message is required";

#[derive(OpenApi)]
#[openapi(
    paths(generate, generate_structured, function_call, count_tokens, generate_with_config),
    components(schemas(
        MessageRequest,
        StructuredRequest,
        TextResponse,
        StructuredResponse,
        TokenCountResponse,
        ConfiguredGenerationResponse
    ))
)]
pub struct GenerateApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(generate))
        .route("/generate-structured", post(generate_structured))
        .route("/function-call", post(function_call))
        .route("/count-tokens", post(count_tokens))
        .route("/generate-with-config", post(generate_with_config))
}

/// Plain prompt to text.
#[utoipa::path(
    post,
    path = "/api/gemini/generate",
    tag = "gemini",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Text generated", body = TextResponse),
        (status = 400, description = "Message missing"),
        (status = 500, description = "Gemini call failed"),
    )
)]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<MessageRequest>,
) -> Result<Json<TextResponse>, ServerError> {
    let message = require(req.message, MESSAGE_REQUIRED)?;
    let response = state.gemini.generate_text(&message).await?;
    Ok(Json(TextResponse { message, response }))
}

/// Prompt constrained to one of the fixed response schemas.
#[utoipa::path(
    post,
    path = "/api/gemini/generate-structured",
    tag = "gemini",
    request_body = StructuredRequest,
    responses(
        (status = 200, description = "Structured object generated", body = StructuredResponse),
        (status = 400, description = "Missing field or unknown schema_type"),
        (status = 500, description = "Gemini call failed"),
    )
)]
pub async fn generate_structured(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<StructuredRequest>,
) -> Result<Json<StructuredResponse>, ServerError> {
    const FIELDS_REQUIRED: &str = "Message and schema_type are required";
    let message = require(req.message, FIELDS_REQUIRED)?;
    let schema_type = require(req.schema_type, FIELDS_REQUIRED)?;

    let schema = ResponseSchema::lookup(schema_type.trim())?;
    let response = state.gemini.generate_structured(&message, schema).await?;
    Ok(Json(StructuredResponse { message, response }))
}

/// Prompt with the `multiply` tool declared; one local tool round at most.
#[utoipa::path(
    post,
    path = "/api/gemini/function-call",
    tag = "gemini",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Final model answer", body = TextResponse),
        (status = 400, description = "Message missing"),
        (status = 500, description = "Gemini call failed"),
    )
)]
pub async fn function_call(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<MessageRequest>,
) -> Result<Json<TextResponse>, ServerError> {
    let message = require(req.message, MESSAGE_REQUIRED)?;
    let response = state.gemini.call_function(&message).await?;
    Ok(Json(TextResponse { message, response }))
}

#[utoipa::path(
    post,
    path = "/api/gemini/count-tokens",
    tag = "gemini",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Token count", body = TokenCountResponse),
        (status = 400, description = "Message missing"),
    )
)]
pub async fn count_tokens(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<MessageRequest>,
) -> Result<Json<TokenCountResponse>, ServerError> {
    let message = require(req.message, MESSAGE_REQUIRED)?;
    let tokens = state.gemini.count_tokens(&message).await?;
    info!(tokens, "counted prompt tokens");
    Ok(Json(TokenCountResponse { tokens }))
}

/// Prompt with the configured sampling preset and safety thresholds.
///
/// Generation failures are reported in the body as `{success: false, error}`.
#[utoipa::path(
    post,
    path = "/api/gemini/generate-with-config",
    tag = "gemini",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Text generated", body = ConfiguredGenerationResponse),
        (status = 400, description = "Message missing"),
        (status = 500, description = "Gemini call failed", body = ConfiguredGenerationResponse),
    )
)]
pub async fn generate_with_config(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<MessageRequest>,
) -> Result<(StatusCode, Json<ConfiguredGenerationResponse>), ServerError> {
    let message = require(req.message, MESSAGE_REQUIRED)?;

    match state.gemini.generate_with_config(&message).await {
        Ok(output) => Ok((
            StatusCode::OK,
            Json(ConfiguredGenerationResponse {
                success: true,
                output: Some(output),
                error: None,
            }),
        )),
        Err(e) => {
            let err = ServerError::from(e);
            error!(error = %err, "configured generation failed");
            Ok((
                err.status(),
                Json(ConfiguredGenerationResponse {
                    success: false,
                    output: None,
                    error: Some(err.to_string()),
                }),
            ))
        }
    }
}
