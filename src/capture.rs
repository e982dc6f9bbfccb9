use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::BlockCallback;
use crate::client::{ChannelSender, ConnectionState};
use crate::stats::{self, SharedStats};
use crate::types::events::client::InputAudioBufferAppendEvent;
use crate::types::ClientEvent;
use crate::utils::audio;

/// One captured block, quantized and encoded for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundAudioFrame {
    pcm: Vec<i16>,
    encoded: String,
}

impl OutboundAudioFrame {
    pub fn from_block(block: &[f32]) -> Self {
        let pcm: Vec<i16> = block.iter().copied().map(audio::quantize).collect();
        let encoded = audio::encode_pcm16(&pcm);
        Self { pcm, encoded }
    }

    pub fn pcm(&self) -> &[i16] {
        &self.pcm
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn into_event(self) -> ClientEvent {
        ClientEvent::InputAudioBufferAppend(InputAudioBufferAppendEvent::new(self.encoded))
    }
}

/// Turns microphone blocks into `input_audio_buffer.append` frames.
///
/// Runs inside the device callback: it never waits on the network. Frames
/// captured while the channel is not open are dropped and never retried.
#[derive(Clone)]
pub struct CapturePipeline {
    sender: ChannelSender,
    stats: SharedStats,
    /// Set while blocks are being dropped; cleared by the next successful send.
    dropping: Arc<AtomicBool>,
}

impl CapturePipeline {
    pub(crate) fn new(sender: ChannelSender, stats: SharedStats) -> Self {
        Self {
            sender,
            stats,
            dropping: Arc::default(),
        }
    }

    /// Encodes and hands off one block. Returns whether it was accepted for sending.
    pub fn process_block(&self, block: &[f32]) -> bool {
        stats::record(&self.stats, |s| s.frame_captured());
        let state = self.sender.state();
        if state != ConnectionState::Open {
            self.record_drop(state);
            return false;
        }

        let frame = OutboundAudioFrame::from_block(block);
        if self.sender.send(frame.into_event()) {
            stats::record(&self.stats, |s| s.frame_sent());
            self.dropping.store(false, Ordering::Release);
            true
        } else {
            self.record_drop(self.sender.state());
            false
        }
    }

    /// Counts a dropped block. Only the first of a run is logged at `warn!`.
    fn record_drop(&self, state: ConnectionState) -> bool {
        stats::record(&self.stats, |s| s.frame_dropped());
        let first = !self.dropping.swap(true, Ordering::AcqRel);
        if first {
            tracing::warn!("dropping captured audio, channel {:?}", state);
        } else {
            tracing::trace!("channel {:?}, dropping captured block", state);
        }
        first
    }

    pub(crate) fn into_callback(self) -> BlockCallback {
        Box::new(move |block: &[f32]| {
            self.process_block(block);
        })
    }
}
