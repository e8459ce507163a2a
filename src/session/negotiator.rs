//! Offer/answer negotiation against the camera server.
//!
//! The exchange runs in two halves. [`exchange_offer`] performs the network
//! steps (offer, local description, ICE gathering, signaling round trip) and
//! may be cancelled. [`apply_answer`] applies the returned description and is
//! only invoked by the manager once it has checked that the answer belongs to
//! the running session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time;

use super::display::InboundStream;
use super::{SessionDescription, SessionError};

/// ICE gathering progress of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

/// Callback invoked for each inbound media stream.
pub type StreamHandler = Arc<dyn Fn(InboundStream) + Send + Sync>;

/// A receive-only peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, SessionError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SessionError>;

    /// Subscribe to gathering state. Dropping the receiver unsubscribes.
    fn gathering_state(&self) -> watch::Receiver<GatheringState>;

    /// Current local description, including gathered candidates.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}

/// Creates peer connections with receive-only audio and video transceivers.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self, on_stream: StreamHandler) -> Result<Arc<dyn PeerConnection>, SessionError>;
}

/// The signaling endpoint: one offer in, one answer out.
#[async_trait]
pub trait Signaling: Send + Sync {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, SessionError>;
}

/// Steps 1-4 of negotiation: returns the remote answer, unapplied.
pub async fn exchange_offer(
    peer: &dyn PeerConnection,
    signaling: &dyn Signaling,
    gathering_timeout: Duration,
) -> Result<SessionDescription, SessionError> {
    let offer = peer.create_offer().await?;
    tracing::debug!("Created local offer ({} bytes)", offer.sdp.len());

    // Subscribe before applying so a fast completion is not missed.
    let gathering = peer.gathering_state();
    peer.set_local_description(offer).await?;

    wait_for_gathering(gathering, gathering_timeout).await?;
    tracing::debug!("ICE gathering complete");

    let local = peer
        .local_description()
        .await
        .ok_or_else(|| SessionError::Description("no local description after gathering".into()))?;

    tracing::info!("Sending {} to signaling endpoint", local.kind);
    signaling.exchange(&local).await
}

/// Step 5 of negotiation: validate and apply the remote description.
pub async fn apply_answer(
    peer: &dyn PeerConnection,
    answer: SessionDescription,
) -> Result<(), SessionError> {
    if answer.kind != "answer" && answer.kind != "pranswer" {
        return Err(SessionError::MalformedAnswer(format!(
            "unexpected description type '{}'",
            answer.kind
        )));
    }
    if answer.sdp.trim().is_empty() {
        return Err(SessionError::MalformedAnswer("empty sdp".into()));
    }
    peer.set_remote_description(answer).await
}

/// Wait for ICE gathering to reach `Complete`.
///
/// Returns immediately if it already has. Otherwise resumes on the first
/// transition to `Complete`, or fails after `limit`.
pub async fn wait_for_gathering(
    mut state: watch::Receiver<GatheringState>,
    limit: Duration,
) -> Result<(), SessionError> {
    if *state.borrow_and_update() == GatheringState::Complete {
        return Ok(());
    }

    match time::timeout(limit, state.wait_for(|s| *s == GatheringState::Complete)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(SessionError::Description(
            "peer connection dropped during ICE gathering".into(),
        )),
        Err(_) => Err(SessionError::GatheringTimeout(limit)),
    }
}

/// In-memory peers and signaling for exercising the session without a network.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    pub const FAKE_OFFER_SDP: &str = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n";
    pub const FAKE_CANDIDATE: &str = "a=candidate:1 1 udp 2130706431 192.0.2.10 50000 typ host\r\n";

    /// Peer that completes gathering on `set_local_description` unless stalled.
    pub struct FakePeer {
        gathering: watch::Sender<GatheringState>,
        auto_gather: bool,
        fail_offer: bool,
        local: Mutex<Option<SessionDescription>>,
        remote: Mutex<Option<SessionDescription>>,
        closed: AtomicUsize,
    }

    impl FakePeer {
        fn build(auto_gather: bool, fail_offer: bool) -> Arc<Self> {
            let (gathering, _) = watch::channel(GatheringState::New);
            Arc::new(Self {
                gathering,
                auto_gather,
                fail_offer,
                local: Mutex::new(None),
                remote: Mutex::new(None),
                closed: AtomicUsize::new(0),
            })
        }

        pub fn new() -> Arc<Self> {
            Self::build(true, false)
        }

        /// Gathering never completes on its own.
        pub fn stalled() -> Arc<Self> {
            Self::build(false, false)
        }

        pub fn failing_offer() -> Arc<Self> {
            Self::build(true, true)
        }

        pub fn into_dyn(self: Arc<Self>) -> Arc<dyn PeerConnection> {
            self
        }

        pub fn set_gathering(&self, state: GatheringState) {
            self.gathering.send_replace(state);
        }

        pub fn remote(&self) -> Option<SessionDescription> {
            self.remote.lock().unwrap().clone()
        }

        pub fn close_count(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PeerConnection for FakePeer {
        async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
            if self.fail_offer {
                return Err(SessionError::Offer("no codecs registered".into()));
            }
            Ok(SessionDescription::new("offer", FAKE_OFFER_SDP))
        }

        async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
            *self.local.lock().unwrap() = Some(desc);
            if self.auto_gather {
                self.gathering.send_replace(GatheringState::Gathering);
                self.gathering.send_replace(GatheringState::Complete);
            } else {
                self.gathering.send_replace(GatheringState::Gathering);
            }
            Ok(())
        }

        fn gathering_state(&self) -> watch::Receiver<GatheringState> {
            self.gathering.subscribe()
        }

        async fn local_description(&self) -> Option<SessionDescription> {
            let local = self.local.lock().unwrap().clone()?;
            if *self.gathering.borrow() == GatheringState::Complete {
                Some(SessionDescription::new(local.kind, local.sdp + FAKE_CANDIDATE))
            } else {
                Some(local)
            }
        }

        async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
            *self.remote.lock().unwrap() = Some(desc);
            Ok(())
        }

        async fn close(&self) -> Result<(), SessionError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Signaling endpoint with a canned reply and an optional round-trip delay.
    pub struct FakeSignaling {
        reply: Result<SessionDescription, SessionError>,
        delay: Duration,
        offers: Mutex<Vec<SessionDescription>>,
    }

    impl FakeSignaling {
        pub fn answering() -> Arc<Self> {
            Self::with_reply(Ok(SessionDescription::new("answer", "v=0\r\na=sendonly\r\n")))
        }

        pub fn with_reply(reply: Result<SessionDescription, SessionError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay: Duration::ZERO,
                offers: Mutex::new(Vec::new()),
            })
        }

        pub fn delayed(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(SessionDescription::new("answer", "v=0\r\na=sendonly\r\n")),
                delay,
                offers: Mutex::new(Vec::new()),
            })
        }

        pub fn offers(&self) -> Vec<SessionDescription> {
            self.offers.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Signaling for FakeSignaling {
        async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, SessionError> {
            self.offers.lock().unwrap().push(offer.clone());
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            self.reply.clone()
        }
    }

    /// Factory handing out fresh peers and keeping them for inspection.
    pub struct FakeFactory {
        make: Box<dyn Fn() -> Arc<FakePeer> + Send + Sync>,
        fail: bool,
        peers: Mutex<Vec<Arc<FakePeer>>>,
        handlers: Mutex<Vec<StreamHandler>>,
    }

    impl FakeFactory {
        pub fn new(make: impl Fn() -> Arc<FakePeer> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                make: Box::new(make),
                fail: false,
                peers: Mutex::new(Vec::new()),
                handlers: Mutex::new(Vec::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                make: Box::new(FakePeer::new),
                fail: true,
                peers: Mutex::new(Vec::new()),
                handlers: Mutex::new(Vec::new()),
            })
        }

        pub fn peer(&self, index: usize) -> Arc<FakePeer> {
            self.peers.lock().unwrap()[index].clone()
        }

        pub fn created(&self) -> usize {
            self.peers.lock().unwrap().len()
        }

        /// Deliver an inbound stream through the handler of the latest peer.
        pub fn deliver(&self, stream: InboundStream) {
            let handler = self.handlers.lock().unwrap().last().cloned();
            if let Some(handler) = handler {
                handler(stream);
            }
        }
    }

    #[async_trait]
    impl PeerFactory for FakeFactory {
        async fn create(&self, on_stream: StreamHandler) -> Result<Arc<dyn PeerConnection>, SessionError> {
            if self.fail {
                return Err(SessionError::Connection("api not initialized".into()));
            }
            let peer = (self.make)();
            self.peers.lock().unwrap().push(peer.clone());
            self.handlers.lock().unwrap().push(on_stream);
            Ok(peer.into_dyn())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    const LIMIT: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn test_exchange_sends_gathered_offer() {
        let peer = FakePeer::new();
        let signaling = FakeSignaling::answering();

        let answer = exchange_offer(peer.as_ref(), signaling.as_ref(), LIMIT)
            .await
            .unwrap();
        assert_eq!(answer.kind, "answer");

        let offers = signaling.offers();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].kind, "offer");
        assert!(offers[0].sdp.contains("a=candidate:"), "offer must carry candidates");
        // Nothing applied until the manager says so.
        assert!(peer.remote().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gathering_already_complete_returns_immediately() {
        let (tx, rx) = watch::channel(GatheringState::Complete);
        let started = time::Instant::now();
        wait_for_gathering(rx, LIMIT).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gathering_resumes_on_first_complete() {
        let (tx, rx) = watch::channel(GatheringState::New);
        let waiter = tokio::spawn(wait_for_gathering(rx, LIMIT));

        time::sleep(Duration::from_millis(300)).await;
        tx.send_replace(GatheringState::Gathering);
        time::sleep(Duration::from_millis(300)).await;
        assert!(!waiter.is_finished());

        tx.send_replace(GatheringState::Complete);
        waiter.await.unwrap().unwrap();
        // The subscription is gone once the wait is over.
        assert_eq!(tx.receiver_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_waits_for_late_gathering() {
        let peer = FakePeer::stalled();
        let signaling = FakeSignaling::answering();
        let exchange = tokio::spawn({
            let peer = peer.clone();
            let signaling = signaling.clone();
            async move { exchange_offer(peer.as_ref(), signaling.as_ref(), LIMIT).await }
        });

        time::sleep(Duration::from_secs(2)).await;
        assert!(signaling.offers().is_empty(), "offer posted before gathering completed");

        peer.set_gathering(GatheringState::Complete);
        let answer = exchange.await.unwrap().unwrap();
        assert_eq!(answer.kind, "answer");
        let offers = signaling.offers();
        assert_eq!(offers.len(), 1);
        assert!(offers[0].sdp.ends_with(FAKE_CANDIDATE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gathering_wait_is_bounded() {
        let peer = FakePeer::stalled();
        let signaling = FakeSignaling::answering();

        let err = exchange_offer(peer.as_ref(), signaling.as_ref(), LIMIT)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::GatheringTimeout(LIMIT));
        assert!(signaling.offers().is_empty());
    }

    #[tokio::test]
    async fn test_offer_failure_stops_exchange() {
        let peer = FakePeer::failing_offer();
        let signaling = FakeSignaling::answering();

        let err = exchange_offer(peer.as_ref(), signaling.as_ref(), LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Offer(_)));
        assert!(signaling.offers().is_empty());
    }

    #[tokio::test]
    async fn test_signaling_error_propagates() {
        let peer = FakePeer::new();
        let signaling =
            FakeSignaling::with_reply(Err(SessionError::Signaling("connection refused".into())));

        let err = exchange_offer(peer.as_ref(), signaling.as_ref(), LIMIT)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Signaling("connection refused".into()));
    }

    #[tokio::test]
    async fn test_apply_answer_rejects_wrong_type() {
        let peer = FakePeer::new();
        let err = apply_answer(peer.as_ref(), SessionDescription::new("offer", "v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MalformedAnswer(_)));

        let err = apply_answer(peer.as_ref(), SessionDescription::new("answer", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MalformedAnswer(_)));
        assert!(peer.remote().is_none());

        apply_answer(peer.as_ref(), SessionDescription::new("answer", "v=0"))
            .await
            .unwrap();
        assert_eq!(peer.remote().unwrap().sdp, "v=0");
    }
}
