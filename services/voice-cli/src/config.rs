//! Configuration for the voice CLI, loaded from the environment (and `.env`).

use std::env;

use agent_voice::consts::{AUTH_TOKEN_VAR, WS_URL_VAR};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_url: Option<String>,
    pub auth_token: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `AGENT_VOICE_WS_URL`: (Optional) Base WebSocket URL; the session id is appended.
    /// *   `AGENT_VOICE_AUTH_TOKEN`: (Optional) Bearer token sent on the handshake.
    /// *   `AGENT_VOICE_INPUT_DEVICE` / `AGENT_VOICE_OUTPUT_DEVICE`: (Optional) Device names.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Ignored if not present.
        dotenvy::dotenv().ok();

        let ws_url = non_empty(WS_URL_VAR);
        if let Some(url) = &ws_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::InvalidValue(
                    WS_URL_VAR.to_string(),
                    format!("'{}' is not a ws:// or wss:// URL", url),
                ));
            }
        }

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = parse_log_level(&log_level_str)?;

        Ok(Self {
            ws_url,
            auth_token: non_empty(AUTH_TOKEN_VAR),
            input_device: non_empty("AGENT_VOICE_INPUT_DEVICE"),
            output_device: non_empty("AGENT_VOICE_OUTPUT_DEVICE"),
            log_level,
        })
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn parse_log_level(value: &str) -> Result<Level, ConfigError> {
    value
        .parse::<Level>()
        .map_err(|_| ConfigError::InvalidLogLevel(value.to_string()))
}
