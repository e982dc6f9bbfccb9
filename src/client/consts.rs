pub const WS_URL_VAR: &str = "AGENT_VOICE_WS_URL";
pub const AUTH_TOKEN_VAR: &str = "AGENT_VOICE_AUTH_TOKEN";

pub const BASE_URL: &str = "ws://localhost:8000/ws";
pub const DEFAULT_CAPACITY: usize = 1024;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
