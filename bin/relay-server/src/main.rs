//! relay-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev),
//!    optionally teeing into a daily-rolling log file.
//! 3. Open the SQLite database and run pending migrations.
//! 4. Build the Gemini client and the generation service over it.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.
//!    Shutdown also cancels in-flight file ingestion.

mod config;
mod entities;
mod error;
mod extract;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use relay_gemini::{GeminiClient, GeminiService};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: RELAY_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    // The guard flushes the file writer on drop; keep it alive until exit.
    let (writer, _log_guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "relay-server.log");
            let (file, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(std::io::stdout.and(file)), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "relay-server starting");

    if cfg.gemini_api_key.trim().is_empty() {
        anyhow::bail!("GEMINI_API_KEY must be set");
    }

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Gemini client ───────────────────────────────────────────────────────
    let client = GeminiClient::new(cfg.client_config())?;
    let gemini = GeminiService::new(Arc::new(client), cfg.service_settings());
    info!(
        model = %cfg.gemini_model,
        base_url = %cfg.gemini_base_url,
        timeout_secs = cfg.gemini_timeout_secs,
        "Gemini client ready"
    );

    // ── 5. Shared application state ────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store: Arc::new(store),
        gemini,
        shutdown: shutdown.clone(),
    });

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, max_upload_mb = cfg.max_upload_mb, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(stop_on_signal(shutdown))
        .await?;

    info!("relay-server stopped");
    Ok(())
}

/// Which event asked the relay to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupt,
    #[cfg_attr(not(unix), allow(dead_code))]
    Terminate,
    /// The token was cancelled elsewhere.
    Cancelled,
}

/// Resolves on SIGINT, SIGTERM or an external cancel, then cancels `shutdown`
/// so pending file-state polls give up instead of holding the server open.
///
/// A handler that fails to install never fires; it does not trigger a stop.
async fn stop_on_signal(shutdown: CancellationToken) {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => StopReason::Interrupt,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGINT");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                StopReason::Terminate
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<StopReason>();

    let reason = tokio::select! {
        r = interrupt => r,
        r = terminate => r,
        _ = shutdown.cancelled() => StopReason::Cancelled,
    };
    info!(?reason, "stopping relay; cancelling in-flight ingestion");
    shutdown.cancel();
}
