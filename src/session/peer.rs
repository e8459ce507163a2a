//! Peer connections backed by the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

use super::display::{InboundStream, MediaPacket};
use super::negotiator::{GatheringState, PeerConnection, PeerFactory, StreamHandler};
use super::{MediaKind, SessionDescription, SessionError};

/// Packets buffered between the RTP reader and a display surface.
const PACKET_QUEUE: usize = 256;

/// Builds receive-only peer connections with the default codecs.
pub struct WebRtcPeerFactory {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcPeerFactory {
    pub fn new(ice_servers: Vec<String>) -> Result<Self, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| SessionError::Connection(format!("codec registration: {}", e)))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| SessionError::Connection(format!("interceptor registration: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, ice_servers })
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self, on_stream: StreamHandler) -> Result<Arc<dyn PeerConnection>, SessionError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.rtc_config())
                .await
                .map_err(|e| SessionError::Connection(e.to_string()))?,
        );

        let (gathering_tx, gathering_rx) = watch::channel(GatheringState::New);
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            tracing::debug!("ICE gatherer state: {:?}", state);
            gathering_tx.send_replace(match state {
                RTCIceGathererState::Gathering => GatheringState::Gathering,
                RTCIceGathererState::Complete => GatheringState::Complete,
                _ => GatheringState::New,
            });
            Box::pin(async {})
        }));

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::info!("Peer connection state: {:?}", state);
            Box::pin(async {})
        }));

        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let on_stream = Arc::clone(&on_stream);
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    RTPCodecType::Video => MediaKind::Video,
                    other => {
                        tracing::warn!("Ignoring track of unknown kind {:?}", other);
                        return;
                    }
                };

                let (tx, rx) = mpsc::channel(PACKET_QUEUE);
                let stream = InboundStream {
                    kind,
                    stream_id: track.stream_id(),
                    track_id: track.id(),
                    codec: track.codec().capability.mime_type,
                    packets: rx,
                };
                tokio::spawn(read_rtp(track, tx));
                on_stream(stream);
            })
        }));

        // Receive-only: no local tracks, one transceiver per kind.
        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| SessionError::Connection(format!("add {:?} transceiver: {}", kind, e)))?;
        }

        Ok(Arc::new(WebRtcPeer {
            pc,
            gathering: gathering_rx,
        }))
    }
}

/// Forward RTP packets from a remote track until it ends or the sink goes away.
async fn read_rtp(track: Arc<TrackRemote>, tx: mpsc::Sender<MediaPacket>) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _)) => {
                let packet = MediaPacket {
                    sequence: packet.header.sequence_number,
                    timestamp: packet.header.timestamp,
                    payload: packet.payload,
                };
                if tx.send(packet).await.is_err() {
                    tracing::debug!("Sink for track {} detached", track.id());
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("Track {} ended: {}", track.id(), e);
                return;
            }
        }
    }
}

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    gathering: watch::Receiver<GatheringState>,
}

fn to_description(desc: RTCSessionDescription) -> SessionDescription {
    SessionDescription::new(desc.sdp_type.to_string(), desc.sdp)
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, SessionError> {
    let parsed = match desc.kind.as_str() {
        "offer" => RTCSessionDescription::offer(desc.sdp),
        "answer" => RTCSessionDescription::answer(desc.sdp),
        "pranswer" => RTCSessionDescription::pranswer(desc.sdp),
        other => {
            return Err(SessionError::MalformedAnswer(format!(
                "unsupported description type '{}'",
                other
            )))
        }
    };
    parsed.map_err(|e| SessionError::MalformedAnswer(e.to_string()))
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        self.pc
            .create_offer(None)
            .await
            .map(to_description)
            .map_err(|e| SessionError::Offer(e.to_string()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| SessionError::Description(e.to_string()))
    }

    fn gathering_state(&self) -> watch::Receiver<GatheringState> {
        self.gathering.clone()
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(to_description)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| SessionError::Description(e.to_string()))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.pc
            .close()
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_description_type_is_malformed() {
        let err = to_rtc(SessionDescription::new("rollback", "")).unwrap_err();
        assert!(matches!(err, SessionError::MalformedAnswer(_)));
    }

    #[tokio::test]
    async fn test_offer_declares_receive_only_media() {
        let factory = WebRtcPeerFactory::new(Vec::new()).unwrap();
        let peer = factory.create(Arc::new(|_| {})).await.unwrap();

        let offer = peer.create_offer().await.unwrap();
        assert_eq!(offer.kind, "offer");
        assert!(offer.sdp.contains("m=video"));
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("a=recvonly"));
        assert!(!offer.sdp.contains("a=sendrecv"));

        peer.close().await.unwrap();
    }
}
