//! Client configuration loaded from environment variables.
//!
//! Everything except the message key has a default, so a local backend can
//! be reached with only `PARLEY_MESSAGE_KEY` (or a passphrase) set.

use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{
    APP_NAME, DEFAULT_MESSAGE_LIMIT, DEFAULT_POLL_INTERVAL_SECS, MAX_MESSAGE_LIMIT,
    MIN_SEARCH_DEBOUNCE_MS,
};
use parley_shared::crypto::parse_hex_key;
use parley_shared::MessageCipher;

use crate::error::ClientError;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin; the `/api` prefix is appended per request.
    /// Env: `PARLEY_SERVER_URL`
    /// Default: `http://127.0.0.1:8000`
    pub server_url: String,

    /// Codec for message bodies, built from the provisioned shared secret.
    /// Env: `PARLEY_MESSAGE_KEY` (64 hex chars) or `PARLEY_MESSAGE_PASSPHRASE`
    /// Default: none; the client refuses to start without it.
    pub cipher: Option<MessageCipher>,

    /// Upper bound for a whole request.
    /// Env: `PARLEY_REQUEST_TIMEOUT_SECS`
    /// Default: `8`
    pub request_timeout: Duration,

    /// Env: `PARLEY_CONNECT_TIMEOUT_SECS`
    /// Default: `4`
    pub connect_timeout: Duration,

    /// Fixed cadence of the directory/message poll.
    /// Env: `PARLEY_POLL_INTERVAL_SECS`
    /// Default: `5`
    pub poll_interval: Duration,

    /// Messages fetched per load, clamped to the backend's 1..=100.
    /// Env: `PARLEY_MESSAGE_LIMIT`
    /// Default: `50`
    pub message_limit: u32,

    /// Quiet period applied to user search input. Never below 300 ms.
    /// Env: `PARLEY_SEARCH_DEBOUNCE_MS`
    /// Default: `300`
    pub search_debounce: Duration,

    /// SQLite file holding the persisted session.
    /// Env: `PARLEY_DB_PATH`
    /// Default: platform data directory.
    pub db_path: Option<PathBuf>,

    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            cipher: None,
            request_timeout: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(4),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            message_limit: DEFAULT_MESSAGE_LIMIT,
            search_debounce: Duration::from_millis(MIN_SEARCH_DEBOUNCE_MS),
            db_path: None,
            user_agent: format!(
                "{}/{}",
                APP_NAME.to_lowercase(),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = var("PARLEY_SERVER_URL") {
            config.server_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(hex_key) = var("PARLEY_MESSAGE_KEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.cipher = Some(MessageCipher::new(key)),
                Err(e) => tracing::warn!(error = %e, "Invalid PARLEY_MESSAGE_KEY, ignoring"),
            }
        }

        if config.cipher.is_none() {
            if let Some(passphrase) = var("PARLEY_MESSAGE_PASSPHRASE").filter(|p| !p.is_empty()) {
                config.cipher = Some(MessageCipher::from_passphrase(&passphrase));
            }
        }

        if let Some(secs) = parse_secs(&var, "PARLEY_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_secs(&var, "PARLEY_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_secs(&var, "PARLEY_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(limit) = parse_var::<u32>(&var, "PARLEY_MESSAGE_LIMIT") {
            config.message_limit = limit.clamp(1, MAX_MESSAGE_LIMIT);
        }

        if let Some(ms) = parse_var::<u64>(&var, "PARLEY_SEARCH_DEBOUNCE_MS") {
            config.search_debounce = Duration::from_millis(ms.max(MIN_SEARCH_DEBOUNCE_MS));
        }

        if let Some(path) = var("PARLEY_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let url = self.server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) || url.len() < 8 {
            return Err(ClientError::Config(format!(
                "server url must be http(s), got {url:?}"
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config("request timeout must be non-zero".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::Config("connect timeout must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }

    /// The message codec, or a config error when no key was provisioned.
    pub fn message_cipher(&self) -> Result<MessageCipher, ClientError> {
        self.cipher.clone().ok_or_else(|| {
            ClientError::Config(
                "no message key: set PARLEY_MESSAGE_KEY or PARLEY_MESSAGE_PASSPHRASE".into(),
            )
        })
    }
}

fn parse_var<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = var(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

/// A whole number of seconds. Zero is rejected like any other bad value.
fn parse_secs(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    match parse_var::<u64>(var, name)? {
        0 => {
            tracing::warn!(name, "Zero is not allowed, using default");
            None
        }
        secs => Some(secs),
    }
}
