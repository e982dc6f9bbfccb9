use agent_voice_types::audio::{AudioFormat, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use secrecy::SecretString;

use crate::client::consts::{AUTH_TOKEN_VAR, BASE_URL, DEFAULT_CAPACITY, WS_URL_VAR};

/// Where and how the engine talks to the agent.
#[derive(Debug)]
pub struct Config {
    base_url: String,
    auth_token: Option<SecretString>,
    sample_rate: u32,
    block_size: usize,
    capacity: usize,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_auth_token(mut self, auth_token: &str) -> Self {
        self.config.auth_token = Some(SecretString::from(auth_token.to_string()));
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = block_size;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults, with the endpoint and token taken from the environment when set.
    pub fn new() -> Self {
        Self {
            base_url: std::env::var(WS_URL_VAR)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| BASE_URL.to_string()),
            auth_token: std::env::var(AUTH_TOKEN_VAR)
                .ok()
                .filter(|token| !token.is_empty())
                .map(SecretString::from),
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_token(&self) -> Option<&SecretString> {
        self.auth_token.as_ref()
    }

    /// `{base_url}/{session_id}`
    pub fn endpoint(&self, session_id: &str) -> String {
        format!("{}/{}", self.base_url, session_id)
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::mono(self.sample_rate, self.block_size)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .with_base_url("wss://agents.example.com/voice/")
            .with_auth_token("t0ken")
            .with_sample_rate(16_000)
            .with_block_size(512)
            .with_capacity(0)
            .build();

        assert_eq!(config.endpoint("abc123"), "wss://agents.example.com/voice/abc123");
        assert_eq!(config.auth_token().unwrap().expose_secret(), "t0ken");
        assert_eq!(config.audio_format(), AudioFormat::mono(16_000, 512));
        assert_eq!(config.capacity(), 1);
    }
}
