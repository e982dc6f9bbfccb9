mod config;

use std::io::Write;
use std::sync::Arc;

use agent_voice::types::LogEntry;
use agent_voice::utils::device;
use agent_voice::{CpalBackend, Engine, EventSink};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::config::Config;

#[derive(Parser)]
#[command(version, about = "Talk to a remote agent over one voice session")]
struct Cli {
    /// Session id returned by the session-creation endpoint
    session_id: Option<String>,

    /// Print the available audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

/// Prints agent output to the terminal.
struct ConsoleSink {
    closed: Arc<Notify>,
}

impl EventSink for ConsoleSink {
    fn on_transcript_delta(&self, delta: &str) {
        print!("{}", delta);
        let _ = std::io::stdout().flush();
    }

    fn on_transcript_final(&self, _segment: &str) {
        println!();
    }

    fn on_agents_logs(&self, payload: serde_json::Value) {
        println!("[agents] {}", payload);
    }

    fn on_log_entry(&self, entry: LogEntry) {
        println!(
            "[{}] {}: {}",
            entry.timestamp().to_rfc3339(),
            entry.label(),
            entry.text()
        );
    }

    fn on_tool_calling(&self, active: bool, message: Option<String>) {
        match (active, message) {
            (true, Some(message)) => println!("[tool] {}", message),
            (true, None) => println!("[tool] working..."),
            (false, _) => tracing::debug!("tool call finished"),
        }
    }

    fn on_connection_closed(&self, reason: Option<String>) {
        tracing::warn!("connection closed by agent: {:?}", reason);
        self.closed.notify_one();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();

    if args.list_devices {
        println!("Input devices:");
        println!("{}", device::get_available_inputs().context("Failed to list input devices")?);
        println!("Output devices:");
        println!("{}", device::get_available_outputs().context("Failed to list output devices")?);
        return Ok(());
    }

    let session_id = args
        .session_id
        .context("A session id is required unless --list-devices is given")?;

    let mut builder = agent_voice::Config::builder();
    if let Some(url) = &config.ws_url {
        builder = builder.with_base_url(url);
    }
    if let Some(token) = &config.auth_token {
        builder = builder.with_auth_token(token);
    }
    let engine_config = builder.build();

    let mut backend = CpalBackend::new();
    if let Some(name) = &config.input_device {
        backend = backend.with_input_device(name);
    }
    if let Some(name) = &config.output_device {
        backend = backend.with_output_device(name);
    }

    let closed = Arc::new(Notify::new());
    let sink = Arc::new(ConsoleSink {
        closed: closed.clone(),
    });
    let mut engine = Engine::new(engine_config, Arc::new(backend), sink);

    engine
        .start(&session_id)
        .await
        .with_context(|| format!("Failed to start session {}", session_id))?;
    tracing::info!("Session {} is live. Speak, then press Ctrl-C to finish.", session_id);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
        _ = closed.notified() => {}
    }

    engine.stop().await;
    let stats = engine.stats();
    tracing::info!(
        "frames sent {}/{} (dropped {}), chunks rendered {}/{} (discarded {}), barge-ins {}",
        stats.frames_sent(),
        stats.frames_captured(),
        stats.frames_dropped(),
        stats.chunks_rendered(),
        stats.chunks_received(),
        stats.chunks_discarded(),
        stats.barge_ins()
    );
    Ok(())
}
