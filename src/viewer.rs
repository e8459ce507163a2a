//! Line-oriented front ends: `watch` and `console`.
//!
//! Both reflect session state as plain text. The terminal UI in `tui` builds
//! on the same [`Viewer`] bootstrap.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::ServerClient;
use crate::config::{Config, SessionLimits};
use crate::session::{
    DisplaySurfaces, MediaKind, SessionError, SessionEvent, SessionHandle, SessionStatus,
    StatsSink, StreamStats, WebRtcPeerFactory,
};

/// A connected viewer: running session manager plus its display surfaces.
pub struct Viewer {
    pub handle: SessionHandle,
    pub limits: SessionLimits,
    pub audio: Arc<StatsSink>,
    pub video: Arc<StatsSink>,
}

impl Viewer {
    /// Resolve server limits and spawn the session manager.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Arc::new(ServerClient::new(config)?);
        tracing::info!("Camera server: {}", client.base_url());

        let limits = client.session_limits(config.fallback_duration()).await;
        let factory = WebRtcPeerFactory::new(config.ice_servers.clone())
            .context("Failed to initialize WebRTC")?;

        let audio = StatsSink::new(MediaKind::Audio);
        let video = StatsSink::new(MediaKind::Video);
        let display = Arc::new(DisplaySurfaces::new(audio.clone(), video.clone()));

        let handle = SessionHandle::spawn(
            Arc::new(factory),
            client,
            display,
            limits.max_duration,
            config.session_settings(),
        );

        Ok(Self {
            handle,
            limits,
            audio,
            video,
        })
    }

    pub fn stats(&self, kind: MediaKind) -> StreamStats {
        match kind {
            MediaKind::Audio => self.audio.stats(),
            MediaKind::Video => self.video.stats(),
        }
    }
}

pub fn time_left_text(seconds: u64) -> String {
    format!("Streaming time left: {} seconds", seconds)
}

pub fn stats_text(kind: MediaKind, stats: &StreamStats) -> String {
    if stats.stream_id.is_empty() {
        return format!("{}: no stream", kind);
    }
    format!(
        "{}: {} [{}] {} packets, {} bytes{}",
        kind,
        stats.stream_id,
        stats.codec,
        stats.packets,
        stats.bytes,
        if stats.live { "" } else { " (ended)" }
    )
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Status(SessionStatus::Active) => println!("Session started"),
        SessionEvent::Status(SessionStatus::Idle) => println!("Session stopped"),
        SessionEvent::Remaining(secs) => println!("{}", time_left_text(*secs)),
        SessionEvent::StreamAttached { kind, stream_id } => {
            println!("Receiving {} stream {}", kind, stream_id)
        }
        SessionEvent::Negotiated => println!("Connected"),
        SessionEvent::Failed(e) => eprintln!("Error: {}", e),
        SessionEvent::Released => println!("Connection closed"),
    }
}

fn print_stats(viewer: &Viewer) {
    for kind in [MediaKind::Video, MediaKind::Audio] {
        println!("  {}", stats_text(kind, &viewer.stats(kind)));
    }
}

/// Start a session right away and follow it until it ends.
pub async fn run_watch(config: &Config) -> Result<()> {
    let mut viewer = Viewer::connect(config).await?;
    println!("{}", time_left_text(viewer.limits.full_seconds()));
    viewer.handle.start();

    loop {
        tokio::select! {
            event = viewer.handle.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                match event {
                    SessionEvent::Released => break,
                    // No connection was created, so nothing will be released.
                    SessionEvent::Failed(SessionError::Connection(_)) => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                viewer.handle.stop();
            }
        }
    }

    print_stats(&viewer);
    viewer.handle.shutdown().await;
    Ok(())
}

/// Interactive control from stdin: start, stop, status, quit.
pub async fn run_console(config: &Config) -> Result<()> {
    let mut viewer = Viewer::connect(config).await?;
    let mut status = SessionStatus::Idle;
    println!("{}", time_left_text(viewer.limits.full_seconds()));
    println!("Commands: start, stop, status, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                match line.trim() {
                    "" => {}
                    "start" | "s" => viewer.handle.start(),
                    "stop" | "x" => viewer.handle.stop(),
                    "status" => {
                        println!("Session {}", status.as_str());
                        print_stats(&viewer);
                    }
                    "quit" | "q" | "exit" => break,
                    other => println!("Unknown command '{}'", other),
                }
            }
            event = viewer.handle.recv() => {
                let Some(event) = event else { break };
                if let SessionEvent::Status(s) = event {
                    status = s;
                }
                print_event(&event);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    viewer.handle.shutdown().await;
    Ok(())
}
