//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use tracing::warn;

use relay_gemini::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, GenerationConfig, PollPolicy, SafetySetting,
    ServiceSettings,
};

/// Runtime configuration for relay-server.
///
/// Every field except the Gemini API key has a default, so a bare
/// `GEMINI_API_KEY=... relay-server` starts a working server.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://relay.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for a daily-rolling log file, in addition to stdout.
    pub log_dir: Option<String>,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,

    /// Comma-separated CORS origin allow-list; unset means any origin.
    pub cors_allowed_origins: Option<String>,

    /// Largest accepted request body, in MiB.
    pub max_upload_mb: usize,

    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_timeout_secs: u64,

    /// First wait between file-state checks.
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_deadline_secs: u64,

    /// Sampling preset of `generate-with-config`.
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Comma-separated stop sequences.
    pub stop_sequences: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".into(),
            database_url: "sqlite://relay.db".into(),
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            enable_swagger: true,
            cors_allowed_origins: None,
            max_upload_mb: 20,
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_MODEL.into(),
            gemini_base_url: DEFAULT_BASE_URL.into(),
            gemini_timeout_secs: 120,
            poll_interval_ms: 2000,
            poll_max_attempts: 30,
            poll_deadline_secs: 600,
            max_output_tokens: 800,
            temperature: 1.0,
            top_p: 0.8,
            top_k: 10,
            stop_sequences: "Title".into(),
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind_address: env_or("RELAY_BIND", &d.bind_address),
            database_url: env_or("RELAY_DATABASE_URL", &d.database_url),
            log_level: env_or("RELAY_LOG", &d.log_level),
            log_json: flag_env("RELAY_LOG_JSON", d.log_json),
            log_dir: std::env::var("RELAY_LOG_DIR").ok().filter(|s| !s.trim().is_empty()),
            enable_swagger: flag_env("RELAY_ENABLE_SWAGGER", d.enable_swagger),
            cors_allowed_origins: std::env::var("RELAY_CORS_ORIGINS")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            max_upload_mb: parse_env("RELAY_MAX_UPLOAD_MB", d.max_upload_mb),
            gemini_api_key: env_or("GEMINI_API_KEY", ""),
            gemini_model: env_or("GEMINI_MODEL", &d.gemini_model),
            gemini_base_url: env_or("GEMINI_BASE_URL", &d.gemini_base_url),
            gemini_timeout_secs: parse_env("GEMINI_TIMEOUT_SECS", d.gemini_timeout_secs),
            poll_interval_ms: parse_env("RELAY_POLL_INTERVAL_MS", d.poll_interval_ms),
            poll_max_attempts: parse_env("RELAY_POLL_MAX_ATTEMPTS", d.poll_max_attempts),
            poll_deadline_secs: parse_env("RELAY_POLL_DEADLINE_SECS", d.poll_deadline_secs),
            max_output_tokens: parse_env("RELAY_MAX_OUTPUT_TOKENS", d.max_output_tokens),
            temperature: parse_env("RELAY_TEMPERATURE", d.temperature),
            top_p: parse_env("RELAY_TOP_P", d.top_p),
            top_k: parse_env("RELAY_TOP_K", d.top_k),
            stop_sequences: env_or("RELAY_STOP_SEQUENCES", &d.stop_sequences),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.gemini_api_key, &self.gemini_model)
            .with_base_url(&self.gemini_base_url)
            .with_request_timeout(Duration::from_secs(self.gemini_timeout_secs))
    }

    pub fn service_settings(&self) -> ServiceSettings {
        let stop_sequences: Vec<String> = self
            .stop_sequences
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        let defaults = PollPolicy::default();
        let initial_interval = Duration::from_millis(self.poll_interval_ms);
        if initial_interval > defaults.max_interval {
            warn!(
                poll_interval_ms = self.poll_interval_ms,
                default_max_ms = defaults.max_interval.as_millis(),
                "RELAY_POLL_INTERVAL_MS exceeds the backoff ceiling; polling at a fixed interval"
            );
        }
        ServiceSettings {
            poll: PollPolicy {
                initial_interval,
                max_interval: defaults.max_interval.max(initial_interval),
                max_attempts: self.poll_max_attempts,
                deadline: Duration::from_secs(self.poll_deadline_secs),
                ..defaults
            },
            tuned_generation: GenerationConfig {
                stop_sequences: (!stop_sequences.is_empty()).then_some(stop_sequences),
                max_output_tokens: Some(self.max_output_tokens),
                temperature: Some(self.temperature),
                top_p: Some(self.top_p),
                top_k: Some(self.top_k),
                ..GenerationConfig::default()
            },
            safety: SafetySetting::block_only_high(),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v).unwrap_or(default))
        .unwrap_or(default)
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_reproduce_the_tuned_preset() {
        let settings = Config::default().service_settings();
        assert_eq!(settings.tuned_generation, GenerationConfig::tuned());
        assert_eq!(settings.poll, PollPolicy::default());
        assert_eq!(settings.safety, SafetySetting::block_only_high());
    }

    #[test]
    fn stop_sequences_are_split_and_trimmed() {
        let cfg = Config {
            stop_sequences: " Title , END ,,".into(),
            ..Config::default()
        };
        assert_eq!(
            cfg.service_settings().tuned_generation.stop_sequences,
            Some(vec!["Title".to_owned(), "END".to_owned()])
        );

        let none = Config {
            stop_sequences: String::new(),
            ..Config::default()
        };
        assert_eq!(none.service_settings().tuned_generation.stop_sequences, None);
    }

    #[test]
    fn upload_limit_is_in_mebibytes() {
        let cfg = Config {
            max_upload_mb: 3,
            ..Config::default()
        };
        assert_eq!(cfg.max_upload_bytes(), 3 * 1024 * 1024);
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn poll_interval_above_backoff_ceiling_is_honored() {
        let cfg = Config {
            poll_interval_ms: 45_000,
            ..Config::default()
        };
        let poll = cfg.service_settings().poll;
        assert_eq!(poll.max_interval, Duration::from_secs(45));
        assert_eq!(poll.delay_for(0), Duration::from_secs(45));
        assert_eq!(poll.delay_for(3), Duration::from_secs(45));
    }
}
