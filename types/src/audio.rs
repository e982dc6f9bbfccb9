/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate the remote agent speaks and listens at unless told otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Number of samples per outbound capture block.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// The PCM16-LE stream format negotiated for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    sample_rate: u32,
    channels: u16,
    block_size: usize,
}

impl AudioFormat {
    /// Mono PCM16 at `sample_rate`, captured in blocks of `block_size` samples.
    pub fn mono(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            channels: 1,
            block_size,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Duration of one capture block in milliseconds.
    pub fn block_duration_ms(&self) -> f64 {
        self.block_size as f64 * 1000.0 / self.sample_rate as f64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono(DEFAULT_SAMPLE_RATE, DEFAULT_BLOCK_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Text,
}
