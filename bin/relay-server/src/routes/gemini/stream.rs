//! Server-sent-event relay of a streamed generation.
//!
//! Fragments are written as they arrive. If the upstream stream fails after
//! it has started, one `event: error` frame is sent and the stream ends.
//! A client disconnect drops the stream, which stops the upstream producer.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::{StreamExt, future};
use tracing::{debug, warn};
use utoipa::OpenApi;

use super::require;
use crate::error::ServerError;
use crate::extract::ApiJson;
use crate::schemas::gemini::MessageRequest;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(stream))]
pub struct StreamApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stream", post(stream))
}

#[utoipa::path(
    post,
    path = "/api/gemini/stream",
    tag = "gemini",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Text fragments as server-sent events", content_type = "text/event-stream", body = String),
        (status = 400, description = "Message missing"),
        (status = 500, description = "Gemini call failed before streaming began"),
    )
)]
pub async fn stream(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<MessageRequest>,
) -> Result<Response, ServerError> {
    let message = require(req.message, "Message is required")?;
    let fragments = state.gemini.stream_text(&message).await?;
    debug!("upstream stream opened");

    let events = fragments
        .scan(false, |failed, fragment| {
            let event = if *failed {
                None
            } else {
                match fragment {
                    Ok(text) => Some(Event::default().data(text)),
                    Err(e) => {
                        *failed = true;
                        warn!(error = %e, "upstream stream failed mid-response");
                        Some(Event::default().event("error").data(e.to_string()))
                    }
                }
            };
            future::ready(event)
        })
        .map(Ok::<Event, Infallible>);

    let mut response = Sse::new(events).keep_alive(KeepAlive::default()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}
