//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection, body limit)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `RELAY_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - Gemini relay routes under `/api/gemini`

pub mod doc;
mod gemini;
mod health;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/api/gemini", gemini::router());

    // ── Swagger UI ────────────────────────────────────────────────────────────
    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Multipart uploads are bounded by this, not axum's 2 MiB default.
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes()))
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state.config)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::state::testing::{state_with, state_with_config};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use relay_gemini::mock::ScriptedModel;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_is_served_with_a_trace_id() {
        let app = build(state_with(Arc::new(ScriptedModel::new())).await);
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(trace::X_TRACE_ID));
    }

    #[tokio::test]
    async fn openapi_document_lists_gemini_routes() {
        let app = build(state_with(Arc::new(ScriptedModel::new())).await);
        let resp = app
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = http_body_util::BodyExt::collect(resp.into_body()).await.unwrap().to_bytes();
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(doc["paths"]["/api/gemini/chat"].is_object());
        assert!(doc["paths"]["/api/gemini/analyze-video"].is_object());
    }

    #[tokio::test]
    async fn swagger_can_be_disabled() {
        let config = Config {
            enable_swagger: false,
            ..Config::default()
        };
        let app = build(state_with_config(Arc::new(ScriptedModel::new()), config).await);
        let resp = app
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
