use crate::playback::PlaybackEngine;
use crate::stats::{self, SharedStats};
use crate::types::ControlEvent;

/// Cuts stale agent audio whenever the conversation moves on.
#[derive(Clone)]
pub struct BargeInController {
    playback: PlaybackEngine,
    stats: SharedStats,
}

impl BargeInController {
    pub(crate) fn new(playback: PlaybackEngine, stats: SharedStats) -> Self {
        Self { playback, stats }
    }

    /// A new user utterance, or an agent response starting, interrupted or cancelled.
    pub fn is_trigger(event: &ControlEvent) -> bool {
        matches!(
            event,
            ControlEvent::SpeechStarted(_)
                | ControlEvent::ResponseCreated(_)
                | ControlEvent::ResponseInterrupted(_)
                | ControlEvent::ResponseCancelled(_)
        )
    }

    /// Hard-stops playback if `event` is a trigger. Must run before the event is dispatched.
    pub fn observe(&self, event: &ControlEvent) -> bool {
        if !Self::is_trigger(event) {
            return false;
        }
        let dropped = self.playback.clear_and_stop();
        stats::record(&self.stats, |s| s.barge_in());
        tracing::info!("barge-in on {}, dropped {} chunks", event.kind(), dropped);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> ControlEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_triggers() {
        for kind in [
            "input_audio_buffer.speech_started",
            "response.created",
            "response.interrupted",
            "response.cancelled",
        ] {
            let json = format!(r#"{{"type":"{}"}}"#, kind);
            assert!(BargeInController::is_trigger(&event(&json)), "{}", kind);
        }
        assert!(!BargeInController::is_trigger(&event(
            r#"{"type":"response.text.delta","delta":"hi"}"#
        )));
        assert!(!BargeInController::is_trigger(&event(
            r#"{"type":"response.text.final"}"#
        )));
    }

    #[tokio::test]
    async fn test_trigger_empties_queue() {
        let stats = stats::shared();
        let playback = PlaybackEngine::new(stats.clone());
        let controller = BargeInController::new(playback.clone(), stats.clone());
        for _ in 0..3 {
            playback.enqueue(vec![0.2; 8]);
        }

        assert!(!controller.observe(&event(r#"{"type":"response.text.final"}"#)));
        assert_eq!(playback.len(), 3);

        assert!(controller.observe(&event(r#"{"type":"response.cancelled"}"#)));
        assert_eq!(playback.len(), 0);
        assert!(!playback.is_rendering());

        let stats = stats.lock().unwrap().clone();
        assert_eq!(stats.barge_ins(), 1);
        assert_eq!(stats.chunks_discarded(), 3);
    }
}
