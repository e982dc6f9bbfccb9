use chrono::{DateTime, Utc};

/// Label used when a handoff status does not carry a title.
pub const DEFAULT_HANDOFF_LABEL: &str = "Agent Handoff";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Handoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Completed,
}

/// A structured execution-log entry synthesized by the engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    kind: LogKind,
    status: LogStatus,
    label: String,
    text: String,
    confidence: f32,
    timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// A completed handoff entry stamped with the current time.
    pub fn handoff(label: Option<&str>, text: String) -> Self {
        Self {
            kind: LogKind::Handoff,
            status: LogStatus::Completed,
            label: label.unwrap_or(DEFAULT_HANDOFF_LABEL).to_string(),
            text,
            confidence: 1.0,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    pub fn status(&self) -> LogStatus {
        self.status
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_defaults() {
        let before = Utc::now();
        let entry = LogEntry::handoff(None, "Routing (transfer)".to_string());
        assert_eq!(entry.kind(), LogKind::Handoff);
        assert_eq!(entry.status(), LogStatus::Completed);
        assert_eq!(entry.label(), "Agent Handoff");
        assert_eq!(entry.confidence(), 1.0);
        assert!(entry.timestamp() >= before);
    }

    #[test]
    fn test_serialize_lowercase_enums() {
        let entry = LogEntry::handoff(Some("Billing"), "x".to_string());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "handoff");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["label"], "Billing");
    }
}
