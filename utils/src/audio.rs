use std::collections::VecDeque;

use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Converts a normalized sample to PCM16.
///
/// Negative values scale by 32768 and positive ones by 32767 so both ends of
/// [-1.0, 1.0] land exactly on `i16::MIN` and `i16::MAX`.
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Converts a PCM16 sample back to a normalized float, mirroring [`quantize`].
pub fn dequantize(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

/// A trait for converting audio sample types to a binary representation (PCM16-LE bytes).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter().flat_map(|&sample| sample.to_le_bytes()).collect()
    }
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| quantize(sample).to_le_bytes())
            .collect()
    }
}

/// Quantizes a block of float samples and encodes it as base64 PCM16-LE.
pub fn encode(pcm32: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm32.to_binary())
}

/// Encodes already-quantized PCM16 samples as base64 PCM16-LE.
pub fn encode_pcm16(pcm16: &[i16]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm16.to_binary())
}

/// Decodes raw PCM16-LE bytes into normalized float samples.
pub fn decode_pcm16_le(bytes: &[u8]) -> anyhow::Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        anyhow::bail!("PCM16 frame has an odd length of {} bytes", bytes.len());
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| dequantize(i16::from_le_bytes([chunk[0], chunk[1]])))
        .collect())
}

/// Decodes a base64 PCM16-LE fragment into normalized float samples.
pub fn decode(base64_fragment: &str) -> anyhow::Result<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_fragment)?;
    decode_pcm16_le(&bytes)
}

/// Averages interleaved frames down to a single channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels > 1 {
        data.chunks(channels)
            .map(|c| c.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        data.to_vec()
    }
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Input frames per resampler pass when converting playback audio.
const STREAM_CHUNK: usize = 256;

/// Resamples a stream that arrives in arbitrary pieces.
///
/// Filter state carries over from one piece to the next. Input that does not
/// fill a whole resampler pass waits for the next piece.
pub struct StreamResampler {
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> anyhow::Result<Self> {
        let resampler = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(
                in_rate as f64,
                out_rate as f64,
                STREAM_CHUNK,
            )?)
        };
        Ok(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    /// Feeds the next piece and returns whatever output it completes.
    pub fn process(&mut self, samples: &[f32]) -> anyhow::Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        let mut consumed = 0;
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() - consumed < needed {
                break;
            }
            let resampled =
                resampler.process(&[&self.pending[consumed..consumed + needed]], None)?;
            if let Some(channel) = resampled.first() {
                out.extend_from_slice(channel);
            }
            consumed += needed;
        }
        self.pending.drain(..consumed);
        Ok(out)
    }

    /// Input samples held back for the next pass.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drops held input and filter history, as after a hard cut.
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

/// Creates a new ring buffer on the heap for shared audio data.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Re-blocks a mono device stream into fixed-size blocks at the session rate.
pub struct BlockAssembler {
    block_size: usize,
    resampler: Option<FastFixedIn<f32>>,
    raw: VecDeque<f32>,
    blocks: VecDeque<f32>,
}

impl BlockAssembler {
    pub fn new(device_rate: u32, session_rate: u32, block_size: usize) -> anyhow::Result<Self> {
        let resampler = if device_rate == session_rate {
            None
        } else {
            Some(create_resampler(
                device_rate as f64,
                session_rate as f64,
                block_size,
            )?)
        };
        Ok(Self {
            block_size,
            resampler,
            raw: VecDeque::with_capacity(block_size * 2),
            blocks: VecDeque::with_capacity(block_size * 2),
        })
    }

    /// Feeds mono samples and calls `emit` once per completed block.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(&[f32])) {
        match self.resampler.as_mut() {
            None => self.blocks.extend(samples),
            Some(resampler) => {
                self.raw.extend(samples);
                loop {
                    let needed = resampler.input_frames_next();
                    if self.raw.len() < needed {
                        break;
                    }
                    let chunk: Vec<f32> = self.raw.drain(..needed).collect();
                    match resampler.process(&[chunk.as_slice()], None) {
                        Ok(resampled) => {
                            if let Some(channel) = resampled.first() {
                                self.blocks.extend(channel.iter().copied());
                            }
                        }
                        Err(e) => tracing::warn!("Failed to resample input chunk: {}", e),
                    }
                }
            }
        }

        while self.blocks.len() >= self.block_size {
            let block: Vec<f32> = self.blocks.drain(..self.block_size).collect();
            emit(&block);
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}
