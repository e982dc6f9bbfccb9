use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::backend::AudioSink;
use crate::error::PlaybackDecodeError;
use crate::stats::{self, SharedStats};
use crate::utils::audio;

/// A decoded inbound audio frame. `index` is its arrival order within the session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackChunk {
    index: u64,
    samples: Vec<f32>,
}

impl PlaybackChunk {
    pub fn new(index: u64, samples: Vec<f32>) -> Self {
        Self { index, samples }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decodes one raw PCM16-LE binary frame into samples.
pub fn decode_frame(bytes: &[u8]) -> Result<Vec<f32>, PlaybackDecodeError> {
    if bytes.is_empty() {
        return Err(PlaybackDecodeError::Empty);
    }
    audio::decode_pcm16_le(bytes).map_err(|e| PlaybackDecodeError::InvalidPcm(e.to_string()))
}

#[derive(Default)]
struct QueueState {
    chunks: VecDeque<PlaybackChunk>,
    /// Index and stop token of the chunk currently rendering.
    rendering: Option<(u64, CancellationToken)>,
    next_index: u64,
    closed: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    available: Notify,
    stats: SharedStats,
}

/// The ordered playback queue and its single render loop.
///
/// Producers append with [`enqueue`](Self::enqueue); the render loop is the only
/// consumer. [`clear_and_stop`](Self::clear_and_stop) may be called from anywhere.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<Inner>,
}

impl PlaybackEngine {
    pub(crate) fn new(stats: SharedStats) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                available: Notify::new(),
                stats,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        lock_state(&self.inner)
    }

    /// Decodes a binary frame and appends it. Undecodable frames are logged and skipped.
    pub fn enqueue_frame(&self, bytes: &[u8]) -> Option<u64> {
        stats::record(&self.inner.stats, |s| s.chunk_received());
        match decode_frame(bytes) {
            Ok(samples) => self.enqueue(samples),
            Err(e) => {
                tracing::warn!("skipping audio frame: {}", e);
                stats::record(&self.inner.stats, |s| s.decode_error());
                None
            }
        }
    }

    /// Appends decoded samples as the next chunk in arrival order.
    ///
    /// Returns the chunk index, or `None` once the engine has shut down.
    pub fn enqueue(&self, samples: Vec<f32>) -> Option<u64> {
        let index = {
            let mut state = self.lock();
            if state.closed {
                return None;
            }
            let index = state.next_index;
            state.next_index += 1;
            state.chunks.push_back(PlaybackChunk::new(index, samples));
            index
        };
        self.inner.available.notify_one();
        Some(index)
    }

    /// Hard-stops the rendering chunk and empties the queue. Idempotent.
    ///
    /// Returns how many chunks were dropped, counting one cut mid-render.
    pub fn clear_and_stop(&self) -> usize {
        let dropped = {
            let mut state = self.lock();
            let mut dropped = state.chunks.len();
            state.chunks.clear();
            if let Some((index, stop)) = state.rendering.take() {
                tracing::debug!("hard-stopping chunk {}", index);
                stop.cancel();
                dropped += 1;
            }
            dropped
        };
        if dropped > 0 {
            stats::record(&self.inner.stats, |s| s.chunks_discarded_by(dropped as u64));
        }
        dropped
    }

    /// Number of chunks waiting behind the one rendering.
    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the chunk currently rendering.
    pub fn rendering(&self) -> Option<u64> {
        self.lock().rendering.as_ref().map(|(index, _)| *index)
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering().is_some()
    }

    /// Starts the render loop against `sink`. The loop runs until [`shutdown`](Self::shutdown).
    pub(crate) fn spawn(&self, sink: Arc<dyn AudioSink>) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(render_loop(inner, sink))
    }

    /// Drops everything, stops the render loop and refuses further chunks.
    pub(crate) fn shutdown(&self) {
        self.clear_and_stop();
        self.lock().closed = true;
        self.inner.available.notify_one();
    }
}

fn lock_state(inner: &Inner) -> MutexGuard<'_, QueueState> {
    // The queue is plain data; a panic elsewhere never leaves it half-updated.
    inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn render_loop(inner: Arc<Inner>, sink: Arc<dyn AudioSink>) {
    loop {
        // The chunk is started under the queue lock: a hard-stop either drops it
        // before it reaches the device or finds it rendering and cuts it.
        let next = {
            let mut state = lock_state(&inner);
            if state.closed {
                break;
            }
            match state.chunks.pop_front() {
                Some(chunk) => {
                    let stop = CancellationToken::new();
                    let started = sink.start(&chunk);
                    if started.is_ok() {
                        state.rendering = Some((chunk.index(), stop.clone()));
                    }
                    Some((chunk.index(), started, stop))
                }
                None => None,
            }
        };

        let Some((index, started, stop)) = next else {
            inner.available.notified().await;
            continue;
        };

        match started {
            Err(e) => {
                tracing::warn!("dropping playback chunk {}: {}", index, e);
                stats::record(&inner.stats, |s| s.decode_error());
            }
            Ok(mut node) => {
                let cut = tokio::select! {
                    biased;
                    _ = stop.cancelled() => true,
                    _ = node.finished() => false,
                };
                if cut {
                    node.stop();
                    tracing::debug!("chunk {} cut by hard-stop", index);
                } else {
                    stats::record(&inner.stats, |s| s.chunk_rendered());
                }
            }
        }

        let mut state = lock_state(&inner);
        if matches!(state.rendering, Some((current, _)) if current == index) {
            state.rendering = None;
        }
    }
    tracing::debug!("render loop stopped");
}
