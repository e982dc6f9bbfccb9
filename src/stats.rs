use std::sync::{Arc, Mutex};

/// Counters for one engine, shared by every component of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_captured: u64,
    frames_sent: u64,
    frames_dropped: u64,
    chunks_received: u64,
    chunks_rendered: u64,
    chunks_discarded: u64,
    decode_errors: u64,
    barge_ins: u64,
    malformed_messages: u64,
}

pub(crate) type SharedStats = Arc<Mutex<Stats>>;

pub(crate) fn shared() -> SharedStats {
    Arc::new(Mutex::new(Stats::default()))
}

/// Applies `update` under the lock. A poisoned lock only costs us the sample.
pub(crate) fn record(stats: &SharedStats, update: impl FnOnce(&mut Stats)) {
    if let Ok(mut stats_guard) = stats.lock() {
        update(&mut stats_guard);
    } else {
        tracing::error!("failed to update stats");
    }
}

impl Stats {
    pub(crate) fn frame_captured(&mut self) {
        self.frames_captured += 1;
    }

    pub(crate) fn frame_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub(crate) fn frame_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    pub(crate) fn chunk_received(&mut self) {
        self.chunks_received += 1;
    }

    pub(crate) fn chunk_rendered(&mut self) {
        self.chunks_rendered += 1;
    }

    pub(crate) fn chunks_discarded_by(&mut self, count: u64) {
        self.chunks_discarded += count;
    }

    pub(crate) fn decode_error(&mut self) {
        self.decode_errors += 1;
    }

    pub(crate) fn barge_in(&mut self) {
        self.barge_ins += 1;
    }

    pub(crate) fn malformed_message(&mut self) {
        self.malformed_messages += 1;
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received
    }

    pub fn chunks_rendered(&self) -> u64 {
        self.chunks_rendered
    }

    /// Chunks dropped by a hard-stop, whether queued or cut mid-render.
    pub fn chunks_discarded(&self) -> u64 {
        self.chunks_discarded
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn barge_ins(&self) -> u64 {
        self.barge_ins
    }

    pub fn malformed_messages(&self) -> u64 {
        self.malformed_messages
    }
}
