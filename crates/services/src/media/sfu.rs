//! Thin contract over the mediasoup media engine: codec table, transport
//! construction, and the producer/consumer operations that Room/Peer drive.
//! Everything here is a stateless wrapper — ownership of the resulting
//! handles lives in [`super::peer::Peer`] and [`super::room::Room`].

use mediasoup::prelude::*;
use meetsfu_config::MediasoupSettings;
use serde::Serialize;
use std::net::IpAddr;
use std::num::NonZero;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SfuError {
    #[error("mediasoup worker error: {0}")]
    Worker(String),
    #[error("mediasoup router error: {0}")]
    Router(String),
    #[error("mediasoup transport error: {0}")]
    Transport(String),
    #[error("mediasoup produce error: {0}")]
    Produce(String),
    #[error("mediasoup consume error: {0}")]
    Consume(String),
    #[error("codec incompatible")]
    CodecIncompatible,
}

/// Fixed codec set: Opus stereo with in-band FEC/DTX, VP8, VP9, H.264 baseline.
pub fn media_codecs() -> Vec<RtpCodecCapability> {
    vec![
        RtpCodecCapability::Audio {
            mime_type: MimeTypeAudio::Opus,
            preferred_payload_type: Some(111),
            clock_rate: NonZero::new(48000).unwrap(),
            channels: NonZero::new(2).unwrap(),
            parameters: RtpCodecParametersParameters::from([
                ("useinbandfec", 1_u32.into()),
                ("usedtx", 1_u32.into()),
            ]),
            rtcp_feedback: vec![RtcpFeedback::TransportCc],
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::Vp8,
            preferred_payload_type: Some(96),
            clock_rate: NonZero::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: video_feedback(),
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::Vp9,
            preferred_payload_type: Some(98),
            clock_rate: NonZero::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: video_feedback(),
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::H264,
            preferred_payload_type: Some(125),
            clock_rate: NonZero::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::from([
                ("level-asymmetry-allowed", 1_u32.into()),
                ("packetization-mode", 1_u32.into()),
                ("profile-level-id", "42e01f".into()),
            ]),
            rtcp_feedback: video_feedback(),
        },
    ]
}

fn video_feedback() -> Vec<RtcpFeedback> {
    vec![
        RtcpFeedback::Nack,
        RtcpFeedback::NackPli,
        RtcpFeedback::CcmFir,
        RtcpFeedback::GoogRemb,
        RtcpFeedback::TransportCc,
    ]
}

pub async fn create_router(worker: &Worker) -> Result<Router, SfuError> {
    let router_options = RouterOptions::new(media_codecs());
    worker
        .create_router(router_options)
        .await
        .map_err(|e| SfuError::Router(e.to_string()))
}

/// Connection details handed back to the client verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportParams {
    pub id: String,
    pub ice_parameters: serde_json::Value,
    pub ice_candidates: serde_json::Value,
    pub dtls_parameters: serde_json::Value,
}

pub async fn create_webrtc_transport(
    router: &Router,
    settings: &MediasoupSettings,
) -> Result<WebRtcTransport, SfuError> {
    let listen_ip: IpAddr = settings
        .listen_ip
        .parse()
        .map_err(|_| SfuError::Transport("invalid listen_ip".into()))?;
    let announced = if settings.announced_ip.is_empty() {
        None
    } else {
        Some(settings.announced_ip.clone())
    };

    let udp_info = ListenInfo {
        protocol: Protocol::Udp,
        ip: listen_ip,
        announced_address: announced.clone(),
        port: None,
        port_range: None,
        flags: None,
        send_buffer_size: None,
        recv_buffer_size: None,
        expose_internal_ip: false,
    };
    let tcp_info = ListenInfo {
        protocol: Protocol::Tcp,
        ip: listen_ip,
        announced_address: announced,
        port: None,
        port_range: None,
        flags: None,
        send_buffer_size: None,
        recv_buffer_size: None,
        expose_internal_ip: false,
    };

    let listen_infos = WebRtcTransportListenInfos::new(udp_info).insert(tcp_info);
    let mut options = WebRtcTransportOptions::new(listen_infos);
    options.enable_udp = true;
    options.enable_tcp = true;
    options.prefer_udp = true;
    // Cap incoming bitrate at 10 Mbps per transport.
    options.max_incoming_bitrate = Some(10_000_000);

    router
        .create_webrtc_transport(options)
        .await
        .map_err(|e| SfuError::Transport(e.to_string()))
}

pub fn transport_params(transport: &WebRtcTransport) -> TransportParams {
    TransportParams {
        id: transport.id().to_string(),
        ice_parameters: serde_json::to_value(transport.ice_parameters()).unwrap_or_default(),
        ice_candidates: serde_json::to_value(transport.ice_candidates()).unwrap_or_default(),
        dtls_parameters: serde_json::to_value(transport.dtls_parameters()).unwrap_or_default(),
    }
}
