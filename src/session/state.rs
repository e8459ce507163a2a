//! Session bookkeeping owned by the manager actor.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::negotiator::PeerConnection;
use super::SessionStatus;

/// The single viewer session.
///
/// `connection` and `started_at` are only present while active or while a
/// release is pending after stop.
pub(crate) struct Session {
    status: SessionStatus,
    started_at: Option<Instant>,
    connection: Option<Arc<dyn PeerConnection>>,
    /// Incremented on every start; tags the negotiation attempt.
    generation: u64,
    release_at: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            started_at: None,
            connection: None,
            generation: 0,
            release_at: None,
            cancel: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark active and start the clock. Returns the new generation.
    pub fn begin(&mut self, now: Instant) -> u64 {
        self.generation += 1;
        self.status = SessionStatus::Active;
        self.started_at = Some(now);
        self.generation
    }

    /// Undo `begin` when no connection could be created.
    pub fn abort(&mut self) {
        self.status = SessionStatus::Idle;
        self.started_at = None;
    }

    /// Take ownership of the connection; returns the token that cancels its
    /// negotiation.
    pub fn attach(&mut self, connection: Arc<dyn PeerConnection>) -> CancellationToken {
        let token = CancellationToken::new();
        self.connection = Some(connection);
        self.cancel = Some(token.clone());
        token
    }

    pub fn connection(&self) -> Option<Arc<dyn PeerConnection>> {
        self.connection.clone()
    }

    /// True when `generation` is the negotiation of the running session.
    pub fn is_current(&self, generation: u64) -> bool {
        self.is_active() && self.connection.is_some() && self.generation == generation
    }

    /// Elapsed time of a running session, `None` when there is nothing to
    /// measure.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        if !self.is_active() || self.connection.is_none() {
            return None;
        }
        self.started_at
            .map(|started| now.saturating_duration_since(started))
    }

    /// Go idle. Cancels the negotiation and schedules the release at
    /// `now + grace` if there is a connection with no release pending yet.
    ///
    /// Returns whether a release was scheduled.
    pub fn deactivate(&mut self, now: Instant, grace: Duration) -> bool {
        self.status = SessionStatus::Idle;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if self.connection.is_none() || self.release_at.is_some() {
            return false;
        }
        self.release_at = Some(now + grace);
        true
    }

    pub fn release_at(&self) -> Option<Instant> {
        self.release_at
    }

    /// Clear the connection and clock. Returns the handle to close.
    pub fn release(&mut self) -> Option<Arc<dyn PeerConnection>> {
        self.release_at = None;
        self.started_at = None;
        self.connection.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::negotiator::testing::FakePeer;

    #[tokio::test(start_paused = true)]
    async fn test_begin_increments_generation() {
        let mut session = Session::new();
        let now = Instant::now();
        assert_eq!(session.begin(now), 1);
        session.abort();
        assert_eq!(session.begin(now), 2);
        assert!(session.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_requires_connection() {
        let mut session = Session::new();
        let start = Instant::now();
        session.begin(start);
        assert_eq!(session.elapsed(start + Duration::from_secs(3)), None);

        session.attach(FakePeer::new().into_dyn());
        assert_eq!(
            session.elapsed(start + Duration::from_secs(3)),
            Some(Duration::from_secs(3))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_schedules_single_release() {
        let mut session = Session::new();
        let now = Instant::now();
        let generation = session.begin(now);
        let token = session.attach(FakePeer::new().into_dyn());

        let grace = Duration::from_millis(500);
        assert!(session.deactivate(now, grace));
        assert!(token.is_cancelled());
        assert!(!session.is_current(generation));
        assert_eq!(session.release_at(), Some(now + grace));

        // A second stop neither reschedules nor moves the deadline.
        assert!(!session.deactivate(now + Duration::from_millis(200), grace));
        assert_eq!(session.release_at(), Some(now + grace));

        assert!(session.release().is_some());
        assert_eq!(session.release_at(), None);
        assert_eq!(session.elapsed(now), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_without_connection_is_noop() {
        let mut session = Session::new();
        assert!(!session.deactivate(Instant::now(), Duration::from_millis(500)));
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.release().is_none());
    }
}
