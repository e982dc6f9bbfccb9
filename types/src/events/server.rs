use serde_json::Value;

/// Every inbound `type` the engine understands. Anything else is forwarded-compatible noise.
const KNOWN_TYPES: &[&str] = &[
    "input_audio_buffer.speech_started",
    "response.created",
    "response.interrupted",
    "response.cancelled",
    "response.text.delta",
    "response.text.final",
    "response.text.done",
    "tool_calling",
    "agents_logs",
    "status_update",
];

/// A parsed inbound text frame.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted(SpeechStartedEvent),
    #[serde(rename = "response.created")]
    ResponseCreated(ResponseLifecycleEvent),
    #[serde(rename = "response.interrupted")]
    ResponseInterrupted(ResponseLifecycleEvent),
    #[serde(rename = "response.cancelled")]
    ResponseCancelled(ResponseLifecycleEvent),
    #[serde(rename = "response.text.delta")]
    TextDelta(TextDeltaEvent),
    #[serde(rename = "response.text.final", alias = "response.text.done")]
    TextFinal(TextFinalEvent),
    #[serde(rename = "tool_calling")]
    ToolCalling(ToolCallingEvent),
    #[serde(rename = "agents_logs")]
    AgentsLogs(AgentsLogsEvent),
    #[serde(rename = "status_update")]
    StatusUpdate(StatusUpdateEvent),
    /// A well-formed frame with a `type` this engine does not know about.
    #[serde(skip)]
    Unknown(Value),
}

impl ControlEvent {
    /// Whether `kind` is one of the inbound types with a typed variant.
    pub fn is_known_type(kind: &str) -> bool {
        KNOWN_TYPES.contains(&kind)
    }

    pub fn kind(&self) -> &str {
        match self {
            ControlEvent::SpeechStarted(_) => "input_audio_buffer.speech_started",
            ControlEvent::ResponseCreated(_) => "response.created",
            ControlEvent::ResponseInterrupted(_) => "response.interrupted",
            ControlEvent::ResponseCancelled(_) => "response.cancelled",
            ControlEvent::TextDelta(_) => "response.text.delta",
            ControlEvent::TextFinal(_) => "response.text.final",
            ControlEvent::ToolCalling(_) => "tool_calling",
            ControlEvent::AgentsLogs(_) => "agents_logs",
            ControlEvent::StatusUpdate(_) => "status_update",
            ControlEvent::Unknown(raw) => raw.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }
}

/// `input_audio_buffer.speech_started` event
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SpeechStartedEvent {
    #[serde(default)]
    event_id: Option<String>,
}

impl SpeechStartedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }
}

/// `response.created`, `response.interrupted` and `response.cancelled` carry no fields we use.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ResponseLifecycleEvent {
    #[serde(default)]
    event_id: Option<String>,
}

impl ResponseLifecycleEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }
}

/// `response.text.delta` event
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TextDeltaEvent {
    delta: String,
}

impl TextDeltaEvent {
    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.text.final` event
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TextFinalEvent {
    #[serde(default)]
    text: Option<String>,
}

impl TextFinalEvent {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// `tool_calling` event
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ToolCallingEvent {
    #[serde(default)]
    state: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ToolCallingEvent {
    /// Whether a tool call is in progress.
    ///
    /// `state` may be a boolean or a word; finishing words mean inactive, a missing
    /// state means the agent just started calling.
    pub fn is_active(&self) -> bool {
        match &self.state {
            None | Some(Value::Null) => true,
            Some(Value::Bool(active)) => *active,
            Some(Value::String(state)) => !matches!(
                state.to_ascii_lowercase().as_str(),
                "end" | "ended" | "done" | "completed" | "finished" | "stopped" | "idle"
            ),
            Some(_) => true,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// `agents_logs` event; the payload is opaque to the engine.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentsLogsEvent {
    #[serde(default)]
    payload: Value,
}

impl AgentsLogsEvent {
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

/// `status_update` event
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StatusUpdateEvent {
    payload: StatusUpdatePayload,
}

impl StatusUpdateEvent {
    pub fn payload(&self) -> &StatusUpdatePayload {
        &self.payload
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StatusUpdatePayload {
    /// A JSON document serialized into a string, see [`HandoffStatus`].
    message: String,
}

impl StatusUpdatePayload {
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Parses the nested `message` document.
    pub fn handoff(&self) -> serde_json::Result<HandoffStatus> {
        serde_json::from_str(&self.message)
    }
}

/// The document nested inside a `status_update` payload.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct HandoffStatus {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ControlEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_deserialize_lifecycle_events() {
        assert!(matches!(
            parse(r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120}"#),
            ControlEvent::SpeechStarted(_)
        ));
        assert!(matches!(parse(r#"{"type":"response.created"}"#), ControlEvent::ResponseCreated(_)));
        assert!(matches!(
            parse(r#"{"type":"response.interrupted","event_id":"e1"}"#),
            ControlEvent::ResponseInterrupted(e) if e.event_id() == Some("e1")
        ));
        assert!(matches!(parse(r#"{"type":"response.cancelled"}"#), ControlEvent::ResponseCancelled(_)));
    }

    #[test]
    fn test_deserialize_text_events() {
        match parse(r#"{"type":"response.text.delta","delta":"Hel"}"#) {
            ControlEvent::TextDelta(e) => assert_eq!(e.delta(), "Hel"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(parse(r#"{"type":"response.text.final"}"#), ControlEvent::TextFinal(_)));
        assert!(matches!(parse(r#"{"type":"response.text.done","text":"Hello"}"#), ControlEvent::TextFinal(e) if e.text() == Some("Hello")));
    }

    #[test]
    fn test_tool_calling_state() {
        let active = |json: &str| match parse(json) {
            ControlEvent::ToolCalling(e) => e.is_active(),
            other => panic!("unexpected event: {:?}", other),
        };
        assert!(active(r#"{"type":"tool_calling","state":true}"#));
        assert!(!active(r#"{"type":"tool_calling","state":false}"#));
        assert!(active(r#"{"type":"tool_calling","state":"start","message":"searching"}"#));
        assert!(!active(r#"{"type":"tool_calling","state":"Completed"}"#));
        assert!(active(r#"{"type":"tool_calling"}"#));
    }

    #[test]
    fn test_status_update_nested_message() {
        let json = r#"{"type":"status_update","payload":{"message":"{\"title\":\"Billing\",\"message\":\"Routing to billing\",\"decision\":\"transfer\"}"}}"#;
        match parse(json) {
            ControlEvent::StatusUpdate(e) => {
                let status = e.payload().handoff().unwrap();
                assert_eq!(status.title.as_deref(), Some("Billing"));
                assert_eq!(status.message.as_deref(), Some("Routing to billing"));
                assert_eq!(status.decision.as_deref(), Some("transfer"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_known_types() {
        assert!(ControlEvent::is_known_type("agents_logs"));
        assert!(ControlEvent::is_known_type("response.text.done"));
        assert!(!ControlEvent::is_known_type("session.created"));
    }
}
