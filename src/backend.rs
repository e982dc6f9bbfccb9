use std::sync::Arc;

use crate::error::{DeviceError, PlaybackDecodeError};
use crate::playback::PlaybackChunk;
use crate::types::audio::AudioFormat;

pub mod native;

pub use native::CpalBackend;

/// Called once per captured block of exactly `block_size` mono samples at the session rate.
pub type BlockCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// A live capture stream. Released on `stop` or drop.
pub trait CaptureStream: Send {
    fn stop(&mut self);
}

pub type CaptureHandle = Box<dyn CaptureStream>;

/// Where sessions get their microphone and speaker from.
pub trait AudioBackend: Send + Sync {
    /// Acquires the input device and starts delivering blocks to `on_block`.
    fn open_input(
        &self,
        format: AudioFormat,
        on_block: BlockCallback,
    ) -> Result<CaptureHandle, DeviceError>;

    /// Acquires the output device and returns the rendering context for it.
    fn open_output(&self, format: AudioFormat) -> Result<Arc<dyn AudioSink>, DeviceError>;
}

/// A rendering context bound to one output device.
pub trait AudioSink: Send + Sync {
    /// Begins playing `chunk` and returns the node that owns it.
    fn start(&self, chunk: &PlaybackChunk) -> Result<Box<dyn RenderNode>, PlaybackDecodeError>;

    /// Releases the context. Later `start` calls fail with `ContextClosed`.
    fn close(&self);
}

/// Plays exactly one chunk.
#[async_trait::async_trait]
pub trait RenderNode: Send {
    /// Resolves once the chunk has fully played.
    async fn finished(&mut self);

    /// Cuts playback immediately.
    fn stop(&mut self);
}
