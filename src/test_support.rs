//! Local stand-ins for the socket peer and the audio devices.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use crate::backend::{
    AudioBackend, AudioSink, BlockCallback, CaptureHandle, CaptureStream, RenderNode,
};
use crate::error::{DeviceError, PlaybackDecodeError};
use crate::playback::PlaybackChunk;
use crate::types::audio::AudioFormat;

const WAIT: Duration = Duration::from_secs(5);

enum ServerCommand {
    Send(Message),
    HangUp,
}

/// A one-connection WebSocket peer on an ephemeral port.
pub(crate) struct MockServer {
    addr: SocketAddr,
    path: Option<oneshot::Receiver<String>>,
    received: mpsc::UnboundedReceiver<Message>,
    commands: mpsc::UnboundedSender<ServerCommand>,
}

impl MockServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (path_tx, path_rx) = oneshot::channel();
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let callback =
                move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = path_tx.send(req.uri().path().to_string());
                    Ok(resp)
                };
            let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    message = read.next() => match message {
                        Some(Ok(message)) => {
                            let closing = matches!(message, Message::Close(_));
                            let _ = received_tx.send(message);
                            if closing {
                                break;
                            }
                        }
                        _ => break,
                    },
                    command = commands_rx.recv() => match command {
                        Some(ServerCommand::Send(message)) => {
                            if write.send(message).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerCommand::HangUp) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            addr,
            path: Some(path_rx),
            received: received_rx,
            commands: commands_tx,
        }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Path of the upgrade request, e.g. `/ws/sess-1`.
    pub(crate) async fn accepted_path(&mut self) -> String {
        let path = self.path.take().expect("path already taken");
        tokio::time::timeout(WAIT, path)
            .await
            .expect("no connection accepted")
            .expect("server task ended")
    }

    /// Next text frame from the client, skipping anything else.
    pub(crate) async fn next_text(&mut self) -> String {
        loop {
            let message = tokio::time::timeout(WAIT, self.received.recv())
                .await
                .expect("timed out waiting for a text frame")
                .expect("connection ended before a text frame");
            if let Message::Text(text) = message {
                return text;
            }
        }
    }

    /// Every text frame received until the client closes the socket.
    pub(crate) async fn texts_until_closed(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        loop {
            let next = tokio::time::timeout(WAIT, self.received.recv())
                .await
                .expect("timed out waiting for close");
            match next {
                Some(Message::Text(text)) => texts.push(text),
                Some(Message::Close(_)) | None => return texts,
                Some(_) => {}
            }
        }
    }

    pub(crate) async fn wait_closed(&mut self) {
        self.texts_until_closed().await;
    }

    pub(crate) fn send(&self, message: Message) {
        let _ = self.commands.send(ServerCommand::Send(message));
    }

    pub(crate) fn hang_up(&self) {
        let _ = self.commands.send(ServerCommand::HangUp);
    }
}

/// Counts live device handles and lets tests drive the capture callback.
#[derive(Default)]
pub(crate) struct FakeBackend {
    open_inputs: Arc<AtomicUsize>,
    open_outputs: Arc<AtomicUsize>,
    fail_input: AtomicBool,
    fail_output: AtomicBool,
    delay_ms: AtomicU64,
    on_block: Arc<Mutex<Option<BlockCallback>>>,
    sink: Mutex<Option<Arc<FakeSink>>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Renders through `sink` instead of an auto-finishing one.
    pub(crate) fn with_sink(sink: Arc<FakeSink>) -> Arc<Self> {
        let backend = Self::default();
        *backend.sink.lock().unwrap() = Some(sink);
        Arc::new(backend)
    }

    pub(crate) fn fail_input(&self) {
        self.fail_input.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_output(&self) {
        self.fail_output.store(true, Ordering::SeqCst);
    }

    /// Makes opening and stopping the input block its thread for `delay`, like a real device.
    pub(crate) fn slow_devices(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn open_inputs(&self) -> usize {
        self.open_inputs.load(Ordering::SeqCst)
    }

    pub(crate) fn open_outputs(&self) -> usize {
        self.open_outputs.load(Ordering::SeqCst)
    }

    /// Feeds one block through the capture callback, as the device would.
    pub(crate) fn capture(&self, block: &[f32]) -> bool {
        match self.on_block.lock().unwrap().as_mut() {
            Some(on_block) => {
                on_block(block);
                true
            }
            None => false,
        }
    }
}

impl AudioBackend for FakeBackend {
    fn open_input(
        &self,
        _format: AudioFormat,
        on_block: BlockCallback,
    ) -> Result<CaptureHandle, DeviceError> {
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));
        std::thread::sleep(delay);
        if self.fail_input.load(Ordering::SeqCst) {
            return Err(DeviceError::InputUnavailable("permission denied".to_string()));
        }
        *self.on_block.lock().unwrap() = Some(on_block);
        self.open_inputs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            open: Some(self.open_inputs.clone()),
            on_block: self.on_block.clone(),
            delay,
        }))
    }

    fn open_output(&self, _format: AudioFormat) -> Result<Arc<dyn AudioSink>, DeviceError> {
        if self.fail_output.load(Ordering::SeqCst) {
            return Err(DeviceError::OutputUnavailable("no output device".to_string()));
        }
        self.open_outputs.fetch_add(1, Ordering::SeqCst);
        let sink = self
            .sink
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(FakeSink::auto_finish);
        sink.attach(self.open_outputs.clone());
        Ok(sink)
    }
}

struct FakeCapture {
    open: Option<Arc<AtomicUsize>>,
    on_block: Arc<Mutex<Option<BlockCallback>>>,
    delay: Duration,
}

impl CaptureStream for FakeCapture {
    fn stop(&mut self) {
        if let Some(open) = self.open.take() {
            std::thread::sleep(self.delay);
            self.on_block.lock().unwrap().take();
            open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Started(u64),
    Finished(u64),
    Stopped(u64),
}

/// A rendering context that records what it played.
///
/// Auto-finishing sinks complete every chunk at once; gated ones hold each chunk
/// until [`release`](Self::release).
pub(crate) struct FakeSink {
    gate: Option<Arc<Notify>>,
    events_tx: mpsc::UnboundedSender<SinkEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SinkEvent>>,
    log: Arc<Mutex<Vec<SinkEvent>>>,
    fail_next: AtomicBool,
    closed: AtomicBool,
    open_outputs: Mutex<Option<Arc<AtomicUsize>>>,
}

impl FakeSink {
    fn build(gate: Option<Arc<Notify>>) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            gate,
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            log: Arc::default(),
            fail_next: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            open_outputs: Mutex::new(None),
        })
    }

    pub(crate) fn auto_finish() -> Arc<Self> {
        Self::build(None)
    }

    pub(crate) fn gated() -> Arc<Self> {
        Self::build(Some(Arc::new(Notify::new())))
    }

    fn attach(&self, open_outputs: Arc<AtomicUsize>) {
        *self.open_outputs.lock().unwrap() = Some(open_outputs);
    }

    /// Lets the chunk currently held by a gated sink finish.
    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub(crate) fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Indices in the order they started rendering.
    pub(crate) fn started(&self) -> Vec<u64> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Started(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub(crate) async fn next_event(&self) -> SinkEvent {
        let mut events = self.events_rx.lock().await;
        tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for a sink event")
            .expect("sink dropped")
    }

    /// Waits for `count` chunks to finish and returns their indices.
    pub(crate) async fn wait_finished(&self, count: usize) -> Vec<u64> {
        let mut finished = Vec::new();
        while finished.len() < count {
            if let SinkEvent::Finished(index) = self.next_event().await {
                finished.push(index);
            }
        }
        finished
    }

    fn record(&self, event: SinkEvent) {
        self.log.lock().unwrap().push(event);
        let _ = self.events_tx.send(event);
    }
}

impl AudioSink for FakeSink {
    fn start(&self, chunk: &PlaybackChunk) -> Result<Box<dyn RenderNode>, PlaybackDecodeError> {
        if self.is_closed() {
            return Err(PlaybackDecodeError::ContextClosed);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PlaybackDecodeError::Render("device glitch".to_string()));
        }
        self.record(SinkEvent::Started(chunk.index()));
        Ok(Box::new(FakeNode {
            index: chunk.index(),
            gate: self.gate.clone(),
            log: self.log.clone(),
            events: self.events_tx.clone(),
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Some(open) = self.open_outputs.lock().unwrap().take() {
                open.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

struct FakeNode {
    index: u64,
    gate: Option<Arc<Notify>>,
    log: Arc<Mutex<Vec<SinkEvent>>>,
    events: mpsc::UnboundedSender<SinkEvent>,
}

impl FakeNode {
    fn record(&self, event: SinkEvent) {
        self.log.lock().unwrap().push(event);
        let _ = self.events.send(event);
    }
}

#[async_trait::async_trait]
impl RenderNode for FakeNode {
    async fn finished(&mut self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.record(SinkEvent::Finished(self.index));
    }

    fn stop(&mut self) {
        self.record(SinkEvent::Stopped(self.index));
    }
}
