//! `cpal` devices behind the [`AudioBackend`] seam.
//!
//! A `cpal::Stream` cannot leave the thread that built it, so every stream lives
//! on its own thread and is held there until its handle is released.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd};

use super::{AudioBackend, AudioSink, BlockCallback, CaptureHandle, CaptureStream, RenderNode};
use crate::error::{DeviceError, PlaybackDecodeError};
use crate::playback::PlaybackChunk;
use crate::types::audio::AudioFormat;
use crate::utils::audio::{self, BlockAssembler, StreamResampler};
use crate::utils::device;

/// Seconds of device-rate audio the output ring buffer holds.
const OUTPUT_BUFFER_SECS: usize = 2;

/// How often a render node checks on the output callback.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// The host's microphone and speaker, picked by name or the default ones.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_device(mut self, name: &str) -> Self {
        self.input_device = Some(name.to_string());
        self
    }

    pub fn with_output_device(mut self, name: &str) -> Self {
        self.output_device = Some(name.to_string());
        self
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(
        &self,
        format: AudioFormat,
        on_block: BlockCallback,
    ) -> Result<CaptureHandle, DeviceError> {
        let device_name = self.input_device.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("audio-input".to_string())
            .spawn(move || {
                let stream = match build_input_stream(device_name.as_deref(), format, on_block) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Returns once the handle drops its sender.
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("input stream released");
            })
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(NativeCapture {
                stop: Some(stop_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(DeviceError::Stream("input thread exited".to_string())),
        }
    }

    fn open_output(&self, format: AudioFormat) -> Result<Arc<dyn AudioSink>, DeviceError> {
        let device_name = self.output_device.clone();
        let shared = Arc::new(OutputState::default());
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_state = shared.clone();
        let thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let (stream, device_rate, producer) =
                    match build_output_stream(device_name.as_deref(), thread_state) {
                        Ok(output) => output,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_tx.send(Ok((device_rate, producer)));
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("output stream released");
            })
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok((device_rate, producer))) => {
                let resampler = match StreamResampler::new(format.sample_rate(), device_rate) {
                    Ok(resampler) => resampler,
                    Err(e) => {
                        drop(stop_tx);
                        let _ = thread.join();
                        return Err(DeviceError::Unsupported(e.to_string()));
                    }
                };
                Ok(Arc::new(NativeSink {
                    resampler: Arc::new(Mutex::new(resampler)),
                    producer: Arc::new(Mutex::new(producer)),
                    shared,
                    stop: Mutex::new(Some(stop_tx)),
                    thread: Mutex::new(Some(thread)),
                }))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(DeviceError::Stream("output thread exited".to_string())),
        }
    }
}

fn build_input_stream(
    device_name: Option<&str>,
    format: AudioFormat,
    mut on_block: BlockCallback,
) -> Result<cpal::Stream, DeviceError> {
    let input = device::get_or_default_input(device_name)
        .map_err(|e| DeviceError::InputUnavailable(e.to_string()))?;
    let supported = input
        .default_input_config()
        .map_err(|e| DeviceError::Unsupported(e.to_string()))?;
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!(
        "input: device={:?}, config={:?}",
        input.name().unwrap_or_default(),
        &config
    );

    let channel_count = config.channels as usize;
    let mut assembler =
        BlockAssembler::new(config.sample_rate.0, format.sample_rate(), format.block_size())
            .map_err(|e| DeviceError::Unsupported(e.to_string()))?;

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mono = audio::downmix(data, channel_count);
        assembler.push(&mono, |block| on_block(block));
    };

    let stream = input
        .build_input_stream(
            &config,
            input_data_fn,
            |err| tracing::error!("an error occurred on input stream: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    stream
        .play()
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    Ok(stream)
}

/// State shared between the output callback and the render nodes.
#[derive(Default)]
struct OutputState {
    /// Samples pushed into the ring buffer and not yet played.
    queued: AtomicUsize,
    /// Set by a hard-stop; the callback empties the ring buffer and clears it.
    flush: AtomicBool,
    closed: AtomicBool,
}

fn build_output_stream(
    device_name: Option<&str>,
    shared: Arc<OutputState>,
) -> Result<(cpal::Stream, u32, HeapProd<f32>), DeviceError> {
    let output = device::get_or_default_output(device_name)
        .map_err(|e| DeviceError::OutputUnavailable(e.to_string()))?;
    let supported = output
        .default_output_config()
        .map_err(|e| DeviceError::Unsupported(e.to_string()))?;
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!(
        "output: device={:?}, config={:?}",
        output.name().unwrap_or_default(),
        &config
    );

    let channel_count = config.channels as usize;
    let device_rate = config.sample_rate.0;
    let (producer, mut consumer): (HeapProd<f32>, HeapCons<f32>) =
        audio::shared_buffer(device_rate as usize * OUTPUT_BUFFER_SECS).split();

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        render_output(&mut consumer, &shared, data, channel_count);
    };

    let stream = output
        .build_output_stream(
            &config,
            output_data_fn,
            |err| tracing::error!("an error occurred on output stream: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    stream
        .play()
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    Ok((stream, device_rate, producer))
}

/// Fills one device buffer from the ring buffer, fanning mono out to every channel.
///
/// A pending flush empties the ring buffer first, so a hard-stop is silent from
/// the very next buffer on.
fn render_output(
    consumer: &mut HeapCons<f32>,
    shared: &OutputState,
    data: &mut [f32],
    channels: usize,
) {
    if shared.flush.load(Ordering::Acquire) {
        consumer.clear();
        shared.queued.store(0, Ordering::Release);
        shared.flush.store(false, Ordering::Release);
    }
    for frame in data.chunks_mut(channels.max(1)) {
        let sample = match consumer.try_pop() {
            Some(sample) => {
                shared.queued.fetch_sub(1, Ordering::AcqRel);
                sample
            }
            None => 0.0,
        };
        frame.fill(sample);
    }
}

struct NativeCapture {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureStream for NativeCapture {
    fn stop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("input thread panicked");
            }
        }
    }
}

impl Drop for NativeCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

struct NativeSink {
    /// Session rate to device rate, continuous across chunks.
    resampler: Arc<Mutex<StreamResampler>>,
    producer: Arc<Mutex<HeapProd<f32>>>,
    shared: Arc<OutputState>,
    stop: Mutex<Option<mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AudioSink for NativeSink {
    fn start(&self, chunk: &PlaybackChunk) -> Result<Box<dyn RenderNode>, PlaybackDecodeError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PlaybackDecodeError::ContextClosed);
        }
        if chunk.is_empty() {
            return Err(PlaybackDecodeError::Empty);
        }
        let samples = lock(&self.resampler)
            .process(chunk.samples())
            .map_err(|e| PlaybackDecodeError::Render(e.to_string()))?;
        let mut node = NativeNode {
            samples,
            pushed: 0,
            producer: self.producer.clone(),
            shared: self.shared.clone(),
            resampler: self.resampler.clone(),
        };
        node.fill();
        Ok(Box::new(node))
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut stop) = self.stop.lock() {
            stop.take();
        }
        let thread = self.thread.lock().ok().and_then(|mut thread| thread.take());
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::error!("output thread panicked");
            }
        }
    }
}

impl Drop for NativeSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// One chunk at device rate, fed into the ring buffer as space frees up.
struct NativeNode {
    samples: Vec<f32>,
    pushed: usize,
    producer: Arc<Mutex<HeapProd<f32>>>,
    shared: Arc<OutputState>,
    resampler: Arc<Mutex<StreamResampler>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NativeNode {
    /// Pushes what fits. Waits out a pending flush so it cannot eat our samples.
    fn fill(&mut self) {
        if self.pushed == self.samples.len() || self.shared.flush.load(Ordering::Acquire) {
            return;
        }
        let Ok(mut producer) = self.producer.lock() else {
            return;
        };
        for &sample in &self.samples[self.pushed..] {
            if producer.try_push(sample).is_err() {
                break;
            }
            self.shared.queued.fetch_add(1, Ordering::AcqRel);
            self.pushed += 1;
        }
    }

    fn is_drained(&self) -> bool {
        self.pushed == self.samples.len() && self.shared.queued.load(Ordering::Acquire) == 0
    }
}

#[async_trait::async_trait]
impl RenderNode for NativeNode {
    async fn finished(&mut self) {
        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return;
            }
            self.fill();
            if self.is_drained() {
                return;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    fn stop(&mut self) {
        self.pushed = self.samples.len();
        self.shared.flush.store(true, Ordering::Release);
        lock(&self.resampler).reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Output {
        consumer: HeapCons<f32>,
        producer: Arc<Mutex<HeapProd<f32>>>,
        shared: Arc<OutputState>,
        resampler: Arc<Mutex<StreamResampler>>,
    }

    impl Output {
        fn new(capacity: usize) -> Self {
            let (producer, consumer) = audio::shared_buffer(capacity).split();
            Self {
                consumer,
                producer: Arc::new(Mutex::new(producer)),
                shared: Arc::new(OutputState::default()),
                resampler: Arc::new(Mutex::new(StreamResampler::new(24_000, 24_000).unwrap())),
            }
        }

        fn node(&self, samples: Vec<f32>) -> NativeNode {
            NativeNode {
                samples,
                pushed: 0,
                producer: self.producer.clone(),
                shared: self.shared.clone(),
                resampler: self.resampler.clone(),
            }
        }

        /// Runs the device callback once over `frames` mono frames.
        fn play(&mut self, frames: usize) -> Vec<f32> {
            let mut data = vec![f32::NAN; frames];
            render_output(&mut self.consumer, &self.shared, &mut data, 1);
            data
        }

        fn queued(&self) -> usize {
            self.shared.queued.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_callback_fans_mono_out_and_pads_with_silence() {
        let mut output = Output::new(16);
        let mut node = output.node(vec![0.1, 0.2]);
        node.fill();

        let mut data = vec![f32::NAN; 6];
        render_output(&mut output.consumer, &output.shared, &mut data, 2);
        assert_eq!(data, vec![0.1, 0.1, 0.2, 0.2, 0.0, 0.0]);
        assert_eq!(output.queued(), 0);
    }

    #[test]
    fn test_stop_mid_chunk_empties_ring_buffer() {
        let mut output = Output::new(16);
        let mut node = output.node(vec![0.5; 8]);
        node.fill();
        assert_eq!(output.queued(), 8);

        assert_eq!(output.play(3), vec![0.5; 3]);
        assert_eq!(output.queued(), 5);

        node.stop();
        assert_eq!(output.play(4), vec![0.0; 4]);
        assert_eq!(output.queued(), 0);
        assert!(!output.shared.flush.load(Ordering::SeqCst));
        assert_eq!(output.play(4), vec![0.0; 4]);
    }

    #[test]
    fn test_next_node_waits_for_flush() {
        let mut output = Output::new(16);
        let mut cut = output.node(vec![0.5; 8]);
        cut.fill();
        cut.stop();

        let mut next = output.node(vec![0.25; 4]);
        next.fill();
        assert_eq!(next.pushed, 0);
        assert_eq!(output.queued(), 8);

        assert_eq!(output.play(2), vec![0.0; 2]);
        next.fill();
        assert_eq!(next.pushed, 4);
        assert_eq!(output.play(4), vec![0.25; 4]);
    }

    #[test]
    fn test_drained_only_after_every_sample_played() {
        let mut output = Output::new(4);
        let mut node = output.node(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        node.fill();
        assert_eq!(node.pushed, 4);
        assert!(!node.is_drained());

        assert_eq!(output.play(3), vec![0.1, 0.2, 0.3]);
        node.fill();
        assert_eq!(node.pushed, 6);
        assert!(!node.is_drained());

        assert_eq!(output.play(3), vec![0.4, 0.5, 0.6]);
        assert!(node.is_drained());
    }

    #[tokio::test]
    async fn test_finished_resolves_once_drained() {
        let mut output = Output::new(8);
        let mut node = output.node(vec![0.1; 4]);
        node.fill();
        output.play(4);

        tokio::time::timeout(Duration::from_secs(1), node.finished())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_finished_resolves_when_closed() {
        let output = Output::new(8);
        let mut node = output.node(vec![0.1; 4]);
        node.fill();
        output.shared.closed.store(true, Ordering::SeqCst);

        tokio::time::timeout(Duration::from_secs(1), node.finished())
            .await
            .unwrap();
    }
}
