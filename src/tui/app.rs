//! TUI application state and main event loop

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use futures::{FutureExt, StreamExt};
use ratatui::DefaultTerminal;
use tokio::time;

use super::log_capture::LogBuffer;
use super::ui;
use crate::config::{Config, SessionLimits};
use crate::session::{SessionCommand, SessionEvent, SessionStatus, StreamStats};
use crate::viewer::Viewer;

/// Refresh period for stream statistics and captured logs.
const REFRESH_MS: u64 = 250;

/// Log lines kept for display.
const MAX_LOG_LINES: usize = 500;

/// Negotiation progress shown next to the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Down,
    Negotiating,
    Connected,
    Failed(String),
}

/// Application state
pub struct App {
    pub should_exit: bool,
    pub server: String,
    pub limits: SessionLimits,
    pub status: SessionStatus,
    pub link: Link,
    /// Seconds shown in the time-left line
    pub time_left: u64,
    pub audio: StreamStats,
    pub video: StreamStats,
    pub show_log: bool,
    pub log_lines: Vec<String>,
    logs: LogBuffer,
}

impl App {
    pub fn new(server: String, limits: SessionLimits, logs: LogBuffer) -> Self {
        Self {
            should_exit: false,
            server,
            limits,
            status: SessionStatus::Idle,
            link: Link::Down,
            time_left: limits.full_seconds(),
            audio: StreamStats::default(),
            video: StreamStats::default(),
            show_log: true,
            log_lines: Vec::new(),
            logs,
        }
    }

    /// Reflect a session event in the view state.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Status(SessionStatus::Active) => {
                self.status = SessionStatus::Active;
                self.link = Link::Negotiating;
            }
            SessionEvent::Status(SessionStatus::Idle) => {
                self.status = SessionStatus::Idle;
                // Keep a failure visible after the session went down.
                if !matches!(self.link, Link::Failed(_)) {
                    self.link = Link::Down;
                }
            }
            SessionEvent::Remaining(secs) => self.time_left = secs,
            SessionEvent::Negotiated => self.link = Link::Connected,
            SessionEvent::Failed(e) => self.link = Link::Failed(e.to_string()),
            SessionEvent::StreamAttached { .. } => {}
            SessionEvent::Released => {
                if !matches!(self.link, Link::Failed(_)) {
                    self.link = Link::Down;
                }
            }
        }
    }

    /// Map a key press to a session command, if any.
    pub fn handle_key(&mut self, code: KeyCode) -> Option<SessionCommand> {
        match code {
            KeyCode::Char('s') if self.status == SessionStatus::Idle => {
                self.link = Link::Down;
                Some(SessionCommand::Start)
            }
            KeyCode::Char('x') if self.status == SessionStatus::Active => Some(SessionCommand::Stop),
            KeyCode::Char('l') => {
                self.show_log = !self.show_log;
                None
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_exit = true;
                None
            }
            _ => None,
        }
    }

    fn refresh(&mut self, viewer: &Viewer) {
        self.audio = viewer.audio.stats();
        self.video = viewer.video.stats();

        self.log_lines.extend(self.logs.take());
        if self.log_lines.len() > MAX_LOG_LINES {
            let excess = self.log_lines.len() - MAX_LOG_LINES;
            self.log_lines.drain(..excess);
        }
    }

    /// Fraction of the session limit still available, for the gauge.
    pub fn time_ratio(&self) -> f64 {
        let full = self.limits.full_seconds();
        if full == 0 {
            return 0.0;
        }
        (self.time_left as f64 / full as f64).clamp(0.0, 1.0)
    }
}

/// Run the TUI until the user quits, restoring the terminal even on panic.
pub async fn run(config: &Config, logs: LogBuffer) -> Result<()> {
    let mut viewer = Viewer::connect(config).await?;
    let mut app = App::new(config.server_url.clone(), viewer.limits, logs);

    let mut terminal = ratatui::init();
    let result = AssertUnwindSafe(run_app(&mut terminal, &mut app, &mut viewer))
        .catch_unwind()
        .await;
    ratatui::restore();

    match result {
        Ok(r) => {
            viewer.handle.shutdown().await;
            r
        }
        Err(e) => std::panic::resume_unwind(e),
    }
}

async fn run_app(terminal: &mut DefaultTerminal, app: &mut App, viewer: &mut Viewer) -> Result<()> {
    let mut keys = EventStream::new();
    let mut refresh = time::interval(Duration::from_millis(REFRESH_MS));

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            key = keys.next() => match key {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(cmd) = app.handle_key(key.code) {
                        viewer.handle.send(cmd);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            event = viewer.handle.recv() => match event {
                Some(event) => app.apply(event),
                None => break,
            },
            _ = refresh.tick() => app.refresh(viewer),
        }
    }

    Ok(())
}
