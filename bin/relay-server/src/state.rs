//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use relay_gemini::GeminiService;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::entities::SqliteStore;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Chat history store.
    pub store: Arc<SqliteStore>,
    /// Generation variants over the configured model.
    pub gemini: GeminiService,
    /// Cancelled when the server starts shutting down.
    pub shutdown: CancellationToken,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use relay_gemini::ServiceSettings;
    use relay_gemini::mock::ScriptedModel;

    /// State over an in-memory database and a scripted model.
    pub async fn state_with(model: Arc<ScriptedModel>) -> Arc<AppState> {
        state_with_config(model, Config::default()).await
    }

    pub async fn state_with_config(model: Arc<ScriptedModel>, config: Config) -> Arc<AppState> {
        let store = SqliteStore::in_memory().await.expect("in-memory store");
        Arc::new(AppState {
            gemini: GeminiService::new(model, ServiceSettings::default()),
            config: Arc::new(config),
            store: Arc::new(store),
            shutdown: CancellationToken::new(),
        })
    }
}
