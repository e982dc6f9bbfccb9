pub mod backend;
pub mod barge_in;
pub mod capture;
mod client;
pub mod error;
pub mod playback;
pub mod router;
pub mod session;
mod stats;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent_voice_types as types;
pub use agent_voice_utils as utils;

pub use backend::{AudioBackend, AudioSink, CpalBackend, RenderNode};
pub use client::{
    connect, consts, ChannelSender, Config, ConfigBuilder, ConnectionState, InboundFrame,
    InboundRx, SignalingChannel,
};
pub use error::{ConnectionError, DeviceError, MalformedMessage, PlaybackDecodeError, SessionError};
pub use router::EventSink;
pub use session::Engine;
pub use stats::Stats;
pub use transcript::Transcript;
