//! Receive-only media session: negotiation, duration limit, teardown.
//!
//! All session state lives in one actor task ([`manager`]). Callers drive it
//! through a [`SessionHandle`] and observe it through [`SessionEvent`]s.

pub mod display;
pub mod manager;
pub mod monitor;
pub mod negotiator;
pub mod peer;
mod state;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use display::{DisplaySurfaces, StatsSink, StreamStats};
pub use manager::{SessionCommand, SessionEvent, SessionHandle};
pub use negotiator::Signaling;
pub use peer::WebRtcPeerFactory;

/// Lifecycle status visible to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Active,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
        }
    }
}

/// Kind of an inbound media stream; selects the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Session description as exchanged with the signaling endpoint.
///
/// Serializes to `{"sdp": "...", "type": "offer"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SessionDescription {
    pub fn new(kind: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: kind.into(),
        }
    }
}

/// Failures of a session attempt. Surfaced once, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already active")]
    AlreadyActive,
    #[error("failed to create peer connection: {0}")]
    Connection(String),
    #[error("failed to create local offer: {0}")]
    Offer(String),
    #[error("failed to apply session description: {0}")]
    Description(String),
    #[error("ICE gathering did not complete within {0:?}")]
    GatheringTimeout(Duration),
    #[error("signaling request failed: {0}")]
    Signaling(String),
    #[error("malformed remote description: {0}")]
    MalformedAnswer(String),
}

/// What happens to an active session whose negotiation failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Leave the session active until an explicit stop or the duration limit.
    #[default]
    Keep,
    /// Route the failure through the normal stop path.
    Stop,
}

/// Timing and policy for the session manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub check_interval: Duration,
    pub teardown_grace: Duration,
    pub gathering_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(1000),
            teardown_grace: Duration::from_millis(500),
            gathering_timeout: Duration::from_secs(10),
            failure_policy: FailurePolicy::Keep,
        }
    }
}
