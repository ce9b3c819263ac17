//! Multi-turn chat backed by the SQLite history store.
//!
//! A chat is only created once the model has answered, together with its
//! first message, so a failed generation never leaves an empty chat behind.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use relay_gemini::Exchange;
use tracing::{debug, info};
use utoipa::OpenApi;

use super::require;
use crate::entities::{Chat, ChatMessage, ChatStore};
use crate::error::ServerError;
use crate::extract::ApiJson;
use crate::schemas::gemini::{ChatMessageResponse, ChatRequest, ChatResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(chat, list_chat_messages, delete_chat),
    components(schemas(ChatRequest, ChatResponse, ChatMessageResponse))
)]
pub struct ChatApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chats/{id}/messages", get(list_chat_messages))
        .route("/chats/{id}", delete(delete_chat))
}

/// Send one chat turn, replaying the chat's earlier exchanges first.
///
/// Without `chat_id` a new chat is started; its id is returned.
#[utoipa::path(
    post,
    path = "/api/gemini/chat",
    tag = "gemini",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Model replied", body = ChatResponse),
        (status = 400, description = "Message missing"),
        (status = 404, description = "Unknown chat_id"),
        (status = 500, description = "Gemini call failed"),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    let message = require(req.message, "Message is required")?;
    let chat_id = req.chat_id.filter(|id| !id.trim().is_empty());

    let (existing, history) = match chat_id {
        Some(id) => {
            let chat = state
                .store
                .get_chat(&id)
                .await?
                .ok_or_else(|| ServerError::NotFound("Chat not found".into()))?;
            let history: Vec<Exchange> = state
                .store
                .list_messages(&chat.id)
                .await?
                .iter()
                .map(ChatMessage::to_exchange)
                .collect();
            (Some(chat), history)
        }
        None => (None, Vec::new()),
    };
    debug!(exchanges = history.len(), "replaying chat history");

    let response = state.gemini.chat(&message, &history).await?;

    let chat_id = match existing {
        Some(chat) => {
            let record = ChatMessage::new(&chat.id, &message, &response);
            state.store.append_message(record).await?;
            chat.id
        }
        None => {
            let chat = Chat::new();
            let record = ChatMessage::new(&chat.id, &message, &response);
            let id = chat.id.clone();
            state.store.create_chat_with_message(chat, record).await?;
            info!(chat_id = %id, "started new chat");
            id
        }
    };

    Ok(Json(ChatResponse {
        chat_id,
        message,
        response,
    }))
}

/// Exchanges of a chat, oldest first.
#[utoipa::path(
    get,
    path = "/api/gemini/chats/{id}/messages",
    tag = "gemini",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat history", body = [ChatMessageResponse]),
        (status = 404, description = "Unknown chat"),
    )
)]
pub async fn list_chat_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChatMessageResponse>>, ServerError> {
    if state.store.get_chat(&id).await?.is_none() {
        return Err(ServerError::NotFound("Chat not found".into()));
    }
    let messages = state.store.list_messages(&id).await?;
    Ok(Json(messages.iter().map(ChatMessage::to_response).collect()))
}

#[utoipa::path(
    delete,
    path = "/api/gemini/chats/{id}",
    tag = "gemini",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 204, description = "Chat and its messages deleted"),
        (status = 404, description = "Unknown chat"),
    )
)]
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if state.store.delete_chat(&id).await? {
        info!(chat_id = %id, "deleted chat");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound("Chat not found".into()))
    }
}
