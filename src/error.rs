use tokio_tungstenite::tungstenite;

use crate::client::ConnectionState;

/// The signaling channel failed to open, or was used in the wrong state.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid session endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("failed to open channel to {endpoint}: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("channel cannot connect from state {0:?}")]
    InvalidState(ConnectionState),
}

/// An audio device could not be acquired or started.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("input device unavailable: {0}")]
    InputUnavailable(String),
    #[error("output device unavailable: {0}")]
    OutputUnavailable(String),
    #[error("unsupported stream configuration: {0}")]
    Unsupported(String),
    #[error("failed to start audio stream: {0}")]
    Stream(String),
}

/// An inbound text frame that could not be turned into a control event.
#[derive(Debug, thiserror::Error)]
pub enum MalformedMessage {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no `type` discriminant")]
    MissingType,
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A binary frame that could not be rendered.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackDecodeError {
    #[error("empty audio frame")]
    Empty,
    #[error("frame is not PCM16-LE: {0}")]
    InvalidPcm(String),
    #[error("rendering context is closed")]
    ContextClosed,
    #[error("render failed: {0}")]
    Render(String),
}

/// Failures that end `Engine::start`. Everything else is logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("a session is already active")]
    AlreadyActive,
}
