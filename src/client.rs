use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use crate::error::ConnectionError;
use crate::types::ClientEvent;

pub mod config;
pub mod consts;
mod utils;

pub use config::{Config, ConfigBuilder};

pub type ClientTx = mpsc::Sender<ClientEvent>;
type ClientRx = mpsc::Receiver<ClientEvent>;
pub type InboundRx = mpsc::Receiver<InboundFrame>;

/// How long `close` waits for queued frames to flush before giving up on the writer.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of one signaling channel. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Closed => 3,
        }
    }
}

#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(state.as_u8())))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Moves to `to` only from `from`.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A payload read off the channel, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// The remote end hung up or the transport failed. Always the last frame.
    Closed(Option<String>),
}

/// A cloneable, non-blocking handle for pushing outbound events.
///
/// Events are silently dropped when the channel is not `Open` or the outbound
/// queue is full; they are never buffered for later.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    state: SharedState,
    tx: ClientTx,
}

impl ChannelSender {
    /// Queues `event` for the writer task. Returns whether it was accepted.
    pub fn send(&self, event: ClientEvent) -> bool {
        let state = self.state.get();
        if state != ConnectionState::Open {
            tracing::trace!("dropping {} on {:?} channel", event.kind(), state);
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("outbound queue full, dropping {}", event.kind());
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!("writer gone, dropping {}", event.kind());
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

/// One persistent WebSocket to a session endpoint.
pub struct SignalingChannel {
    capacity: usize,
    state: SharedState,
    sender: ChannelSender,
    c_rx: Option<ClientRx>,
    shutdown: Option<oneshot::Sender<()>>,
    send_handle: Option<tokio::task::JoinHandle<()>>,
    recv_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SignalingChannel {
    pub fn new(capacity: usize) -> Self {
        let state = SharedState::new(ConnectionState::Idle);
        let (c_tx, c_rx) = mpsc::channel(capacity);
        Self {
            capacity,
            sender: ChannelSender {
                state: state.clone(),
                tx: c_tx,
            },
            state,
            c_rx: Some(c_rx),
            shutdown: None,
            send_handle: None,
            recv_handle: None,
        }
    }

    /// Opens the socket at `{base_url}/{session_id}` and starts the reader and writer tasks.
    ///
    /// Inbound text and binary payloads arrive on the returned receiver in wire order.
    pub async fn connect(
        &mut self,
        config: &Config,
        session_id: &str,
    ) -> Result<InboundRx, ConnectionError> {
        if !self
            .state
            .transition(ConnectionState::Idle, ConnectionState::Connecting)
        {
            return Err(ConnectionError::InvalidState(self.state.get()));
        }
        let endpoint = config.endpoint(session_id);

        let request = match utils::build_request(config, session_id) {
            Ok(request) => request,
            Err(source) => {
                self.state.set(ConnectionState::Closed);
                return Err(ConnectionError::InvalidEndpoint { endpoint, source });
            }
        };

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(source) => {
                self.state.set(ConnectionState::Closed);
                return Err(ConnectionError::Handshake { endpoint, source });
            }
        };
        tracing::info!("signaling channel open: {}", endpoint);

        let (mut write, mut read) = ws_stream.split();
        let (in_tx, in_rx) = mpsc::channel(self.capacity);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let Some(mut c_rx) = self.c_rx.take() else {
            self.state.set(ConnectionState::Closed);
            return Err(ConnectionError::InvalidState(ConnectionState::Closed));
        };

        let state = self.state.clone();
        let send_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = c_rx.recv() => match event {
                        Some(event) => {
                            if !write_event(&mut write, &event).await {
                                state.set(ConnectionState::Closed);
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = &mut shutdown_rx => {
                        // Flush whatever was accepted before the close.
                        while let Ok(event) = c_rx.try_recv() {
                            if !write_event(&mut write, &event).await {
                                break;
                            }
                        }
                        break;
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close socket cleanly: {}", e);
            }
        });

        let state = self.state.clone();
        let recv_handle = tokio::spawn(async move {
            let mut reason = None;
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        reason = Some(e.to_string());
                        break;
                    }
                    Ok(message) => message,
                };
                let frame = match message {
                    Message::Text(text) => {
                        tracing::debug!("received text frame, {} bytes", text.len());
                        InboundFrame::Text(text)
                    }
                    Message::Binary(bin) => {
                        tracing::debug!("received binary frame, {} bytes", bin.len());
                        InboundFrame::Binary(bin)
                    }
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    _ => continue,
                };
                if in_tx.send(frame).await.is_err() {
                    tracing::debug!("inbound receiver dropped, stopping reader");
                    break;
                }
            }
            state.set(ConnectionState::Closed);
            let _ = in_tx.send(InboundFrame::Closed(reason)).await;
        });

        self.shutdown = Some(shutdown_tx);
        self.send_handle = Some(send_handle);
        self.recv_handle = Some(recv_handle);
        if !self
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Open)
        {
            tracing::warn!("channel closed during handshake");
        }
        Ok(in_rx)
    }

    /// See [`ChannelSender::send`].
    pub fn send(&self, event: ClientEvent) -> bool {
        self.sender.send(event)
    }

    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Flushes frames already accepted, sends a close frame and stops both tasks.
    ///
    /// The channel is `Closed` afterwards and cannot be reopened.
    pub async fn close(&mut self) {
        self.state.set(ConnectionState::Closed);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.send_handle.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, handle).await.is_err() {
                tracing::warn!("timed out flushing outbound frames");
            }
        }
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.state.set(ConnectionState::Closed);
        if let Some(handle) = self.send_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
    }
}

async fn write_event<S>(write: &mut S, event: &ClientEvent) -> bool
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match serde_json::to_string(event) {
        Ok(text) => {
            if let Err(e) = write.send(Message::Text(text)).await {
                tracing::error!("failed to send message: {}", e);
                return false;
            }
            true
        }
        Err(e) => {
            tracing::error!("failed to serialize event: {}", e);
            true
        }
    }
}

/// Creates a channel and connects it in one step.
pub async fn connect(
    config: &Config,
    session_id: &str,
) -> Result<(SignalingChannel, InboundRx), ConnectionError> {
    let mut channel = SignalingChannel::new(config.capacity());
    let inbound = channel.connect(config, session_id).await?;
    Ok((channel, inbound))
}
