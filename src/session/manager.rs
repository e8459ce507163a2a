//! Session manager actor.
//!
//! One tokio task owns the [`Session`] and serializes everything that touches
//! it: start/stop commands, monitor ticks, negotiation outcomes and the
//! grace-delayed release. The front end holds a [`SessionHandle`], sends
//! commands and reads [`SessionEvent`]s back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::display::{DisplaySurfaces, InboundStream};
use super::monitor::{DurationMonitor, Verdict};
use super::negotiator::{self, PeerConnection, PeerFactory, Signaling, StreamHandler};
use super::state::Session;
use super::{FailurePolicy, MediaKind, SessionDescription, SessionError, SessionSettings, SessionStatus};

/// Commands sent from the front end to the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    Shutdown,
}

/// Notifications from the session manager to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(SessionStatus),
    /// Whole seconds left in the running session, or the full limit after release.
    Remaining(u64),
    StreamAttached { kind: MediaKind, stream_id: String },
    /// The remote answer was applied.
    Negotiated,
    /// A session attempt failed. Reported once per failure.
    Failed(SessionError),
    /// The connection of a stopped session was closed.
    Released,
}

/// Result of the network half of a negotiation.
enum Outcome {
    Answer {
        generation: u64,
        answer: SessionDescription,
    },
    Failed {
        generation: u64,
        error: SessionError,
    },
    /// A remote track arrived on the connection of `generation`.
    Stream {
        generation: u64,
        stream: InboundStream,
    },
}

/// Handle for interacting with the session manager.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn the manager task. The duration monitor starts ticking immediately.
    pub fn spawn(
        factory: Arc<dyn PeerFactory>,
        signaling: Arc<dyn Signaling>,
        display: Arc<DisplaySurfaces>,
        max_duration: Duration,
        settings: SessionSettings,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let manager = SessionManager {
            session: Session::new(),
            monitor: DurationMonitor::new(max_duration),
            factory,
            signaling,
            display,
            settings,
            events: event_tx,
            outcomes: outcome_tx,
        };
        let task = tokio::spawn(manager.run(cmd_rx, outcome_rx));

        Self {
            cmd_tx,
            event_rx,
            task,
        }
    }

    /// Send a command to the manager (non-blocking).
    pub fn send(&self, cmd: SessionCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::error!("Session manager gone -- {:?} dropped", cmd);
        }
    }

    pub fn start(&self) {
        self.send(SessionCommand::Start);
    }

    pub fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the manager has shut down and all events were read.
    /// Designed to be used inside `tokio::select!`.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Stop the manager, closing any connection immediately, and wait for it.
    pub async fn shutdown(self) {
        self.send(SessionCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!("Session manager task failed: {}", e);
        }
    }
}

struct SessionManager {
    session: Session,
    monitor: DurationMonitor,
    factory: Arc<dyn PeerFactory>,
    signaling: Arc<dyn Signaling>,
    display: Arc<DisplaySurfaces>,
    settings: SessionSettings,
    events: mpsc::UnboundedSender<SessionEvent>,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl SessionManager {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut outcome_rx: mpsc::UnboundedReceiver<Outcome>,
    ) {
        let mut ticker = time::interval_at(
            Instant::now() + self.settings.check_interval,
            self.settings.check_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let release_at = self.session.release_at();
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Start) => self.start().await,
                    Some(SessionCommand::Stop) => self.stop(),
                    Some(SessionCommand::Shutdown) | None => break,
                },
                Some(outcome) = outcome_rx.recv() => self.on_outcome(outcome).await,
                _ = ticker.tick() => self.tick(),
                _ = time::sleep_until(release_at.unwrap_or_else(Instant::now)), if release_at.is_some() => {
                    self.release().await;
                }
            }
        }

        self.session.deactivate(Instant::now(), Duration::ZERO);
        if let Some(connection) = self.session.release() {
            close(connection.as_ref()).await;
        }
        tracing::debug!("Session manager stopped");
    }

    fn emit(&self, event: SessionEvent) {
        // The front end may already be gone during shutdown.
        let _ = self.events.send(event);
    }

    async fn start(&mut self) {
        if self.session.is_active() {
            tracing::warn!("Start ignored: a session is already active");
            self.emit(SessionEvent::Failed(SessionError::AlreadyActive));
            return;
        }

        if self.session.release_at().is_some() {
            tracing::debug!("Releasing previous connection before restart");
            self.release().await;
        }

        let generation = self.session.begin(Instant::now());
        tracing::info!("Starting session #{}", generation);
        self.display.reset();
        self.emit(SessionEvent::Status(SessionStatus::Active));

        let connection = match self.factory.create(self.stream_handler(generation)).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!("Session #{} could not start: {}", generation, e);
                self.session.abort();
                self.emit(SessionEvent::Failed(e));
                self.emit(SessionEvent::Status(SessionStatus::Idle));
                return;
            }
        };

        let cancel = self.session.attach(Arc::clone(&connection));
        self.spawn_negotiation(generation, connection, cancel);
    }

    /// Handler forwarding inbound streams of `generation` to the actor.
    fn stream_handler(&self, generation: u64) -> StreamHandler {
        let outcomes = self.outcomes.clone();
        Arc::new(move |stream: InboundStream| {
            let _ = outcomes.send(Outcome::Stream { generation, stream });
        })
    }

    fn spawn_negotiation(
        &self,
        generation: u64,
        connection: Arc<dyn PeerConnection>,
        cancel: CancellationToken,
    ) {
        let signaling = Arc::clone(&self.signaling);
        let outcomes = self.outcomes.clone();
        let gathering_timeout = self.settings.gathering_timeout;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Negotiation #{} cancelled", generation);
                    return;
                }
                result = negotiator::exchange_offer(connection.as_ref(), signaling.as_ref(), gathering_timeout) => result,
            };

            let outcome = match result {
                Ok(answer) => Outcome::Answer { generation, answer },
                Err(error) => Outcome::Failed { generation, error },
            };
            let _ = outcomes.send(outcome);
        });
    }

    async fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Answer { generation, answer } => {
                let connection = match self.session.connection() {
                    Some(c) if self.session.is_current(generation) => c,
                    _ => {
                        tracing::debug!("Discarding answer of stale negotiation #{}", generation);
                        return;
                    }
                };
                match negotiator::apply_answer(connection.as_ref(), answer).await {
                    Ok(()) => {
                        tracing::info!("Session #{} negotiated", generation);
                        self.emit(SessionEvent::Negotiated);
                    }
                    Err(e) => self.fail(generation, e),
                }
            }
            Outcome::Failed { generation, error } => {
                if !self.session.is_current(generation) {
                    tracing::debug!("Ignoring failure of stale negotiation #{}: {}", generation, error);
                    return;
                }
                self.fail(generation, error);
            }
            Outcome::Stream { generation, stream } => {
                if !self.session.is_current(generation) {
                    tracing::debug!(
                        "Dropping {} stream {} of stale session #{}",
                        stream.kind,
                        stream.stream_id,
                        generation
                    );
                    return;
                }
                let kind = stream.kind;
                let stream_id = stream.stream_id.clone();
                self.display.attach(stream);
                self.emit(SessionEvent::StreamAttached { kind, stream_id });
            }
        }
    }

    fn fail(&mut self, generation: u64, error: SessionError) {
        tracing::error!("Negotiation #{} failed: {}", generation, error);
        self.emit(SessionEvent::Failed(error));
        if self.settings.failure_policy == FailurePolicy::Stop {
            self.stop();
        }
    }

    fn stop(&mut self) {
        let scheduled = self
            .session
            .deactivate(Instant::now(), self.settings.teardown_grace);
        self.emit(SessionEvent::Status(SessionStatus::Idle));
        if scheduled {
            tracing::info!(
                "Session #{} stopped, releasing in {:?}",
                self.session.generation(),
                self.settings.teardown_grace
            );
        } else {
            tracing::debug!("Stop with nothing to release");
        }
    }

    fn tick(&mut self) {
        match self.monitor.check(self.session.elapsed(Instant::now())) {
            Verdict::Idle => {}
            Verdict::Running { remaining } => self.emit(SessionEvent::Remaining(remaining)),
            Verdict::Expired => {
                tracing::info!("Session time limit reached");
                self.emit(SessionEvent::Remaining(0));
                self.stop();
            }
        }
    }

    async fn release(&mut self) {
        let Some(connection) = self.session.release() else {
            return;
        };
        close(connection.as_ref()).await;
        tracing::info!("Session #{} released", self.session.generation());
        self.emit(SessionEvent::Remaining(self.monitor.full_seconds()));
        self.emit(SessionEvent::Released);
    }
}

async fn close(connection: &dyn PeerConnection) {
    if let Err(e) = connection.close().await {
        tracing::warn!("Error closing peer connection: {}", e);
    }
}
