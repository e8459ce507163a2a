//! Session limits published by the camera server at `GET /config`.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

/// Body of the server's `/config` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Maximum streaming time per session, in seconds.
    pub max_connection_time: f64,
    #[serde(default)]
    pub video_width: Option<u32>,
    #[serde(default)]
    pub video_height: Option<u32>,
}

/// Limits resolved once at startup. Never re-fetched mid-session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    pub max_duration: Duration,
    /// Capture resolution advertised by the server, if any.
    pub video_size: Option<(u32, u32)>,
}

impl SessionLimits {
    /// Resolve limits from a fetch result.
    ///
    /// Any failure, including a non-positive or non-finite duration, falls
    /// back to `fallback` and is logged. This is the only non-fatal fetch.
    pub fn resolve(fetched: Result<ServerConfig>, fallback: Duration) -> Self {
        let server = match fetched {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!(
                    "Error fetching server config, using default of {}s: {:#}",
                    fallback.as_secs(),
                    e
                );
                return Self::fallback(fallback);
            }
        };

        let max_duration = match positive_duration(server.max_connection_time) {
            Some(d) => d,
            None => {
                tracing::warn!(
                    "Server sent unusable max_connection_time {}, using default of {}s",
                    server.max_connection_time,
                    fallback.as_secs()
                );
                fallback
            }
        };

        let video_size = server.video_width.zip(server.video_height);
        tracing::info!(
            "Session limit {:.0}s{}",
            max_duration.as_secs_f64(),
            video_size
                .map(|(w, h)| format!(", video {}x{}", w, h))
                .unwrap_or_default()
        );

        Self {
            max_duration,
            video_size,
        }
    }

    pub fn fallback(max_duration: Duration) -> Self {
        Self {
            max_duration,
            video_size: None,
        }
    }

    /// Whole seconds shown when no session is running.
    pub fn full_seconds(&self) -> u64 {
        self.max_duration.as_secs()
    }
}

fn positive_duration(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
