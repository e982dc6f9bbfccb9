/// Agent text for one session, as finished segments plus the one still streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Transcript {
    segments: Vec<String>,
    current: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delta(&mut self, delta: &str) {
        self.current.push_str(delta);
    }

    /// Closes the streaming segment. Empty segments are not kept.
    pub fn finish_segment(&mut self) -> Option<String> {
        if self.current.is_empty() {
            return None;
        }
        let segment = std::mem::take(&mut self.current);
        self.segments.push(segment.clone());
        Some(segment)
    }

    pub fn reset(&mut self) {
        self.segments.clear();
        self.current.clear();
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Every segment, the streaming one included, one per line.
    pub fn text(&self) -> String {
        let mut lines: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        if !self.current.is_empty() {
            lines.push(&self.current);
        }
        lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.current.is_empty()
    }
}
