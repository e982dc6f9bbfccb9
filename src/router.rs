use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::barge_in::BargeInController;
use crate::error::MalformedMessage;
use crate::stats::{self, SharedStats};
use crate::transcript::Transcript;
use crate::types::events::server::HandoffStatus;
use crate::types::{ControlEvent, LogEntry};

/// The UI side of a session: transcript text, execution log and the typing indicator.
///
/// Called from the session's dispatcher task, one event at a time and in wire order.
#[cfg_attr(test, automock)]
pub trait EventSink: Send + Sync {
    fn on_transcript_delta(&self, delta: &str);

    /// A transcript segment was closed; `segment` is its full text.
    fn on_transcript_final(&self, segment: &str);

    /// An `agents_logs` payload, untouched.
    fn on_agents_logs(&self, payload: Value);

    fn on_log_entry(&self, entry: LogEntry);

    fn on_tool_calling(&self, active: bool, message: Option<String>);

    /// The remote end hung up or the transport failed. The session must be restarted.
    fn on_connection_closed(&self, reason: Option<String>);
}

pub(crate) type SharedTranscript = Arc<Mutex<Transcript>>;

pub(crate) fn lock_transcript(transcript: &SharedTranscript) -> MutexGuard<'_, Transcript> {
    transcript
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parses inbound text frames and fans them out to barge-in, transcript and sink.
pub struct Router {
    barge_in: BargeInController,
    sink: Arc<dyn EventSink>,
    transcript: SharedTranscript,
    stats: SharedStats,
}

impl Router {
    pub(crate) fn new(
        barge_in: BargeInController,
        sink: Arc<dyn EventSink>,
        transcript: SharedTranscript,
        stats: SharedStats,
    ) -> Self {
        Self {
            barge_in,
            sink,
            transcript,
            stats,
        }
    }

    /// Parses one text frame. Types without a typed variant come back as `Unknown`.
    pub fn parse(text: &str) -> Result<ControlEvent, MalformedMessage> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MalformedMessage::MissingType)?
            .to_string();
        if !ControlEvent::is_known_type(&kind) {
            return Ok(ControlEvent::Unknown(value));
        }
        serde_json::from_value(value).map_err(|source| MalformedMessage::Payload { kind, source })
    }

    /// Handles one inbound text frame. Malformed frames are logged and dropped.
    pub fn route_text(&self, text: &str) {
        match Self::parse(text) {
            Ok(event) => self.route(event),
            Err(e) => self.malformed(e),
        }
    }

    /// Barge-in runs first so stale audio is gone before anything else reacts.
    pub fn route(&self, event: ControlEvent) {
        self.barge_in.observe(&event);
        self.dispatch(event);
    }

    fn dispatch(&self, event: ControlEvent) {
        match event {
            ControlEvent::TextDelta(e) => {
                lock_transcript(&self.transcript).push_delta(e.delta());
                self.sink.on_transcript_delta(e.delta());
            }
            ControlEvent::TextFinal(e) => {
                let segment = {
                    let mut transcript = lock_transcript(&self.transcript);
                    if let Some(text) = e.text() {
                        if transcript.current().is_empty() {
                            transcript.push_delta(text);
                        }
                    }
                    transcript.finish_segment()
                };
                if let Some(segment) = segment {
                    self.sink.on_transcript_final(&segment);
                }
            }
            ControlEvent::ToolCalling(e) => {
                self.sink
                    .on_tool_calling(e.is_active(), e.message().map(str::to_string));
            }
            ControlEvent::AgentsLogs(e) => {
                self.sink.on_agents_logs(e.into_payload());
            }
            ControlEvent::StatusUpdate(e) => match e.payload().handoff() {
                Ok(status) => self.sink.on_log_entry(handoff_entry(&status)),
                Err(source) => self.malformed(MalformedMessage::Payload {
                    kind: "status_update".to_string(),
                    source,
                }),
            },
            lifecycle @ (ControlEvent::SpeechStarted(_)
            | ControlEvent::ResponseCreated(_)
            | ControlEvent::ResponseInterrupted(_)
            | ControlEvent::ResponseCancelled(_)) => {
                tracing::debug!("{}", lifecycle.kind());
            }
            unknown @ ControlEvent::Unknown(_) => {
                tracing::debug!("ignoring unknown event type {}", unknown.kind());
            }
        }
    }

    pub(crate) fn connection_closed(&self, reason: Option<String>) {
        self.sink.on_connection_closed(reason);
    }

    fn malformed(&self, error: MalformedMessage) {
        tracing::warn!("ignoring malformed message: {}", error);
        stats::record(&self.stats, |s| s.malformed_message());
    }
}

/// Renders a handoff status as an execution-log entry: `"{message} ({decision})"`.
pub fn handoff_entry(status: &HandoffStatus) -> LogEntry {
    let message = status.message.as_deref().unwrap_or_default();
    let text = match status.decision.as_deref() {
        Some(decision) => format!("{} ({})", message, decision),
        None => message.to_string(),
    };
    LogEntry::handoff(status.title.as_deref(), text)
}
