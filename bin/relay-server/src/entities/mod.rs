//! Chat persistence.
//!
//! [`ChatStore`] defines what the handlers need from storage; [`SqliteStore`]
//! implements it on top of `sqlx`. Trait methods use `impl Future` in their
//! signatures so no `async-trait` boxing is involved.
//!
//! `sqlx::migrate!("./migrations")` resolves relative to `CARGO_MANIFEST_DIR`
//! at compile time, so the schema is embedded in the binary. Queries use the
//! runtime-checked `sqlx::query` form; no `DATABASE_URL` is needed to build.

pub mod chat;
pub mod dao;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use chat::ChatStore;
pub use dao::{Chat, ChatMessage};

/// SQLite-backed chat store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL, e.g. `"sqlite://relay.db"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Round-trip a trivial query; used by the health check.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    /// Close the pool; later queries fail with `PoolClosed`.
    #[cfg(test)]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// A private in-memory database.
    ///
    /// Every pooled connection to `:memory:` is a separate database, so the
    /// pool is pinned to one connection that never expires.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn count(&self, table: &str) -> i64 {
        let sql = match table {
            "chats" => "SELECT COUNT(*) FROM chats",
            "chat_messages" => "SELECT COUNT(*) FROM chat_messages",
            other => panic!("unknown table {other}"),
        };
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(&self.pool).await.unwrap();
        n
    }
}

/// Fixed-width RFC 3339 so that text order equals time order.
pub(crate) fn to_db_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}
