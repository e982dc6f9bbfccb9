use std::sync::{Arc, Mutex};

use crate::backend::{AudioBackend, AudioSink, CaptureHandle};
use crate::barge_in::BargeInController;
use crate::capture::CapturePipeline;
use crate::client::{Config, ConnectionState, InboundFrame, InboundRx, SignalingChannel};
use crate::error::{DeviceError, SessionError};
use crate::playback::PlaybackEngine;
use crate::router::{self, EventSink, Router, SharedTranscript};
use crate::stats::{self, SharedStats, Stats};
use crate::transcript::Transcript;
use crate::types::events::client::{InputAudioBufferCommitEvent, ResponseCreateEvent};
use crate::types::ClientEvent;

/// The audio side of a session. Released by `stop` or by the remote end hanging up,
/// whichever comes first; releasing twice is a no-op.
#[derive(Clone)]
struct Devices {
    capture: Arc<Mutex<Option<CaptureHandle>>>,
    output: Arc<dyn AudioSink>,
    playback: PlaybackEngine,
}

impl Devices {
    fn new(capture: CaptureHandle, output: Arc<dyn AudioSink>, playback: PlaybackEngine) -> Self {
        Self {
            capture: Arc::new(Mutex::new(Some(capture))),
            output,
            playback,
        }
    }

    fn take_capture(&self) -> Option<CaptureHandle> {
        self.capture
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    async fn release(&self) {
        let capture = self.take_capture();
        self.playback.shutdown();
        let output = self.output.clone();
        let released = on_device_thread(move || {
            if let Some(mut capture) = capture {
                capture.stop();
            }
            output.close();
            Ok(())
        })
        .await;
        if let Err(e) = released {
            tracing::error!("failed to release audio devices: {}", e);
        }
    }

    fn release_now(&self) {
        if let Some(mut capture) = self.take_capture() {
            capture.stop();
        }
        self.playback.shutdown();
        self.output.close();
    }
}

/// Device calls wait on stream threads, so they run on the blocking pool.
async fn on_device_thread<T, F>(f: F) -> Result<T, DeviceError>
where
    F: FnOnce() -> Result<T, DeviceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeviceError::Stream(e.to_string()))?
}

/// Everything one live session owns. Dropping it releases all of it.
struct ActiveSession {
    id: String,
    channel: SignalingChannel,
    devices: Devices,
    render: Option<tokio::task::JoinHandle<()>>,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl ActiveSession {
    async fn close(&mut self) {
        self.dispatcher.abort();
        self.devices.release().await;
        self.channel.close().await;
        if let Some(render) = self.render.take() {
            if let Err(e) = render.await {
                tracing::warn!("render loop ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.dispatcher.abort();
        self.devices.release_now();
        if let Some(render) = self.render.take() {
            render.abort();
        }
    }
}

/// Runs at most one voice session at a time.
///
/// `start` opens the channel, microphone and speaker together; `stop` releases
/// them together. A session ended by the remote side stays `Closed` until the
/// next `start`.
pub struct Engine {
    config: Config,
    backend: Arc<dyn AudioBackend>,
    sink: Arc<dyn EventSink>,
    transcript: SharedTranscript,
    stats: SharedStats,
    session: Option<ActiveSession>,
    ended: bool,
}

impl Engine {
    pub fn new(config: Config, backend: Arc<dyn AudioBackend>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            backend,
            sink,
            transcript: SharedTranscript::default(),
            stats: stats::shared(),
            session: None,
            ended: false,
        }
    }

    /// Opens a session against `{base_url}/{session_id}`.
    ///
    /// Either everything is acquired or nothing is: on failure the channel and
    /// any device already opened are released before returning.
    pub async fn start(&mut self, session_id: &str) -> Result<(), SessionError> {
        if let Some(state) = self.session.as_ref().map(|s| s.channel.state()) {
            if state != ConnectionState::Closed {
                return Err(SessionError::AlreadyActive);
            }
            self.stop().await;
        }

        router::lock_transcript(&self.transcript).reset();
        match self.open(session_id).await {
            Ok(session) => {
                tracing::info!("session {} started", session_id);
                self.session = Some(session);
                self.ended = false;
                Ok(())
            }
            Err(e) => {
                tracing::error!("failed to start session {}: {}", session_id, e);
                self.ended = true;
                Err(e)
            }
        }
    }

    async fn open(&self, session_id: &str) -> Result<ActiveSession, SessionError> {
        let format = self.config.audio_format();
        let mut channel = SignalingChannel::new(self.config.capacity());
        let inbound = channel.connect(&self.config, session_id).await?;

        let on_block = CapturePipeline::new(channel.sender(), self.stats.clone()).into_callback();
        let backend = self.backend.clone();
        let capture = match on_device_thread(move || backend.open_input(format, on_block)).await {
            Ok(capture) => capture,
            Err(e) => {
                channel.close().await;
                return Err(e.into());
            }
        };

        let backend = self.backend.clone();
        let output = match on_device_thread(move || backend.open_output(format)).await {
            Ok(output) => output,
            Err(e) => {
                let _ = on_device_thread(move || {
                    let mut capture = capture;
                    capture.stop();
                    Ok(())
                })
                .await;
                channel.close().await;
                return Err(e.into());
            }
        };

        let playback = PlaybackEngine::new(self.stats.clone());
        let render = playback.spawn(output.clone());
        let router = Router::new(
            BargeInController::new(playback.clone(), self.stats.clone()),
            self.sink.clone(),
            self.transcript.clone(),
            self.stats.clone(),
        );
        let devices = Devices::new(capture, output, playback);
        let dispatcher = tokio::spawn(dispatch_loop(inbound, router, devices.clone()));

        Ok(ActiveSession {
            id: session_id.to_string(),
            channel,
            devices,
            render: Some(render),
            dispatcher,
        })
    }

    /// Asks the agent to respond to what was said, then releases the session.
    ///
    /// Safe to call when no session is active.
    pub async fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("stop called with no active session");
            return;
        };

        if session.channel.state() == ConnectionState::Open {
            session.channel.send(ClientEvent::InputAudioBufferCommit(
                InputAudioBufferCommitEvent::new(),
            ));
            session
                .channel
                .send(ClientEvent::ResponseCreate(ResponseCreateEvent::new()));
        }
        session.close().await;
        self.ended = true;
        tracing::info!("session {} stopped", session.id);
    }

    pub fn state(&self) -> ConnectionState {
        match &self.session {
            Some(session) => session.channel.state(),
            None if self.ended => ConnectionState::Closed,
            None => ConnectionState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    pub fn transcript(&self) -> Transcript {
        router::lock_transcript(&self.transcript).clone()
    }

    pub fn stats(&self) -> Stats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Consumes inbound frames in wire order: text through the router, binary into playback.
///
/// A remote hang-up is fatal: the devices are released before the UI hears of it.
async fn dispatch_loop(mut inbound: InboundRx, router: Router, devices: Devices) {
    while let Some(frame) = inbound.recv().await {
        match frame {
            InboundFrame::Text(text) => router.route_text(&text),
            InboundFrame::Binary(bytes) => {
                devices.playback.enqueue_frame(&bytes);
            }
            InboundFrame::Closed(reason) => {
                tracing::warn!("session channel closed by remote: {:?}", reason);
                devices.release().await;
                router.connection_closed(reason);
                break;
            }
        }
    }
    tracing::debug!("dispatcher stopped");
}
