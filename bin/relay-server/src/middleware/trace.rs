//! Per-request span with a propagated `x-trace-id`.
//!
//! Small JSON request bodies are logged at debug level. Response bodies are
//! never buffered, so SSE responses flow through untouched.

use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::BodyExt;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Request bodies up to this size are logged verbatim.
const MAX_LOGGED_BODY_BYTES: usize = 1024;

pub async fn trace_middleware(req: Request, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let mut req = log_request_body(req).await;
        if let Some(v) = &trace_header {
            req.headers_mut().insert(X_TRACE_ID, v.clone());
        }

        let mut response = next.run(req).await;

        if let Some(v) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, v);
        }
        // Measured up to the response head; streamed bodies continue afterwards.
        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

async fn log_request_body(req: Request) -> Request {
    let headers = req.headers();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned();
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let small_json = content_type.contains("application/json")
        && content_length.is_some_and(|n| n <= MAX_LOGGED_BODY_BYTES);
    if !small_json {
        if let Some(size) = content_length.filter(|n| *n > 0) {
            debug!(content_type = %content_type, size, "request body not logged");
        }
        return req;
    }

    let (parts, body) = req.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Request::from_parts(parts, Body::empty());
        }
    };
    if let Ok(text) = std::str::from_utf8(&bytes) {
        debug!(body = %text, "request body");
    }
    Request::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::Router;
    use axum::routing::post;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .layer(axum::middleware::from_fn(trace_middleware))
    }

    #[tokio::test]
    async fn existing_trace_id_is_echoed() {
        let id = Uuid::new_v4().to_string();
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(X_TRACE_ID, &id)
                    .body(Body::from("x"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.headers()[X_TRACE_ID], id.as_str());
    }

    #[tokio::test]
    async fn logged_json_body_still_reaches_the_handler() {
        let payload = r#"{"message":"hi"}"#;
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, payload.len())
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(Uuid::parse_str(resp.headers()[X_TRACE_ID].to_str().unwrap()).is_ok());
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], payload.as_bytes());
    }
}
