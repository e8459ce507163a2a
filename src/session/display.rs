//! Display surfaces for inbound media.
//!
//! There is one sink per media kind. A sink holds at most one stream; a
//! later stream of the same kind replaces the earlier one.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::MediaKind;

/// One RTP packet of an inbound stream.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    pub sequence: u16,
    pub timestamp: u32,
    pub payload: Bytes,
}

/// An inbound media stream handed to a display surface.
#[derive(Debug)]
pub struct InboundStream {
    pub kind: MediaKind,
    pub stream_id: String,
    pub track_id: String,
    /// MIME type of the negotiated codec, e.g. `video/VP8`.
    pub codec: String,
    /// Packets in arrival order. Closed when the track ends.
    pub packets: mpsc::Receiver<MediaPacket>,
}

/// Consumer of inbound streams of one kind.
pub trait MediaSink: Send + Sync {
    fn attach(&self, stream: InboundStream);

    /// Drop the current stream, if any, and forget it.
    fn reset(&self);
}

/// Counters for the stream currently attached to a [`StatsSink`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub stream_id: String,
    pub track_id: String,
    pub codec: String,
    pub packets: u64,
    pub bytes: u64,
    pub last_sequence: u16,
    /// RTP timestamp of the latest packet.
    pub last_timestamp: u32,
    /// False once the stream ended or was replaced.
    pub live: bool,
}

/// Sink that drains its stream and keeps packet statistics.
pub struct StatsSink {
    kind: MediaKind,
    stats: Arc<Mutex<StreamStats>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StatsSink {
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            stats: Arc::new(Mutex::new(StreamStats::default())),
            reader: Mutex::new(None),
        })
    }

    /// Snapshot of the current counters.
    pub fn stats(&self) -> StreamStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn stop_reader(&self) -> bool {
        match self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            Some(reader) => {
                reader.abort();
                true
            }
            None => false,
        }
    }
}

impl MediaSink for StatsSink {
    fn attach(&self, stream: InboundStream) {
        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = reader.take() {
            tracing::debug!("Replacing {} stream", self.kind);
            previous.abort();
        }

        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = StreamStats {
            stream_id: stream.stream_id,
            track_id: stream.track_id,
            codec: stream.codec,
            live: true,
            ..StreamStats::default()
        };

        let stats = Arc::clone(&self.stats);
        let kind = self.kind;
        let mut packets = stream.packets;
        *reader = Some(tokio::spawn(async move {
            while let Some(packet) = packets.recv().await {
                let mut s = stats.lock().unwrap_or_else(|e| e.into_inner());
                s.packets += 1;
                s.bytes += packet.payload.len() as u64;
                s.last_sequence = packet.sequence;
                s.last_timestamp = packet.timestamp;
            }
            let mut s = stats.lock().unwrap_or_else(|e| e.into_inner());
            s.live = false;
            tracing::info!(
                "{} stream {} ended after {} packets",
                kind,
                s.stream_id,
                s.packets
            );
        }));
    }

    fn reset(&self) {
        if self.stop_reader() {
            tracing::debug!("Dropping previous {} stream", self.kind);
        }
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = StreamStats::default();
    }
}

impl Drop for StatsSink {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

/// The audio and video surfaces of the viewer.
pub struct DisplaySurfaces {
    audio: Arc<dyn MediaSink>,
    video: Arc<dyn MediaSink>,
}

impl DisplaySurfaces {
    pub fn new(audio: Arc<dyn MediaSink>, video: Arc<dyn MediaSink>) -> Self {
        Self { audio, video }
    }

    /// Route a stream to the surface of its kind.
    pub fn attach(&self, stream: InboundStream) {
        tracing::info!(
            "Attaching {} stream {} track {} ({})",
            stream.kind,
            stream.stream_id,
            stream.track_id,
            stream.codec
        );
        match stream.kind {
            MediaKind::Audio => self.audio.attach(stream),
            MediaKind::Video => self.video.attach(stream),
        }
    }

    /// Clear both surfaces.
    pub fn reset(&self) {
        self.audio.reset();
        self.video.reset();
    }
}
