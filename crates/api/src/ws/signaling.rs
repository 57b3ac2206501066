//! Wire envelopes for the signaling channel: `{event, payload, reqId}`
//! inbound, `{event, payload}` pushes, and `{event: "ack", payload: {reqId,
//! ok, data|error}}` acknowledgements.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct ClientEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "reqId", default)]
    pub req_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServerPush {
    pub event: &'static str,
    pub payload: Value,
}

impl ServerPush {
    pub fn new(event: &'static str, payload: Value) -> Self {
        Self { event, payload }
    }

    pub fn to_message(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct AckPayload {
    #[serde(rename = "reqId")]
    req_id: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn ack_success(req_id: &str, data: Value) -> String {
    let push = ServerPush::new(
        "ack",
        serde_json::to_value(AckPayload {
            req_id: req_id.to_string(),
            ok: true,
            data: Some(data),
            error: None,
        })
        .unwrap_or_default(),
    );
    push.to_message()
}

pub fn ack_error(req_id: &str, error: &SignalingError) -> String {
    let push = ServerPush::new(
        "ack",
        serde_json::to_value(AckPayload {
            req_id: req_id.to_string(),
            ok: false,
            data: None,
            error: Some(error.message()),
        })
        .unwrap_or_default(),
    );
    push.to_message()
}

/// The error taxonomy used for acks and internal signalling.
#[derive(Debug, Clone)]
pub enum SignalingError {
    Unauthenticated,
    NotBound,
    NotFound(String),
    PermissionDenied(String),
    InvalidArgument(String),
    InvalidState(String),
    AlreadyExists(String),
    CodecIncompatible,
    UpstreamUnavailable(String),
    Internal(String),
}

impl SignalingError {
    pub fn code(&self) -> &'static str {
        match self {
            SignalingError::Unauthenticated => "UNAUTHENTICATED",
            SignalingError::NotBound => "NOT_BOUND",
            SignalingError::NotFound(_) => "NOT_FOUND",
            SignalingError::PermissionDenied(_) => "PERMISSION_DENIED",
            SignalingError::InvalidArgument(_) => "INVALID_ARGUMENT",
            SignalingError::InvalidState(_) => "INVALID_STATE",
            SignalingError::AlreadyExists(_) => "ALREADY_EXISTS",
            SignalingError::CodecIncompatible => "CODEC_INCOMPATIBLE",
            SignalingError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            SignalingError::Internal(_) => "INTERNAL",
        }
    }

    pub fn message(&self) -> String {
        match self {
            SignalingError::Unauthenticated => "unauthenticated".to_string(),
            SignalingError::NotBound => "connection is not bound to a meeting".to_string(),
            SignalingError::NotFound(what) => format!("{what} not found"),
            SignalingError::PermissionDenied(why) => why.clone(),
            SignalingError::InvalidArgument(why) => why.clone(),
            SignalingError::InvalidState(why) => why.clone(),
            SignalingError::AlreadyExists(what) => format!("{what} already exists"),
            SignalingError::CodecIncompatible => "codec incompatible".to_string(),
            SignalingError::UpstreamUnavailable(why) => why.clone(),
            SignalingError::Internal(why) => why.clone(),
        }
    }
}

impl From<meetsfu_services::media::RoomError> for SignalingError {
    fn from(err: meetsfu_services::media::RoomError) -> Self {
        use meetsfu_services::media::RoomError;
        match err {
            RoomError::PeerNotFound => SignalingError::NotFound("peer".into()),
            RoomError::BreakoutNotFound => SignalingError::NotFound("breakout room".into()),
            RoomError::TransportNotFound => SignalingError::InvalidState("transport not set up".into()),
            RoomError::ScreenAlreadyExists => {
                SignalingError::AlreadyExists("screen share".into())
            }
            RoomError::Sfu(sfu_err) => SignalingError::UpstreamUnavailable(sfu_err.to_string()),
        }
    }
}

impl From<meetsfu_services::DaoError> for SignalingError {
    fn from(err: meetsfu_services::DaoError) -> Self {
        use meetsfu_services::DaoError;
        match err {
            DaoError::NotFound => SignalingError::NotFound("resource".into()),
            DaoError::DuplicateKey(msg) => SignalingError::AlreadyExists(msg),
            DaoError::Forbidden(msg) => SignalingError::PermissionDenied(msg),
            DaoError::Validation(msg) => SignalingError::InvalidArgument(msg),
            DaoError::Mongo(e) => SignalingError::UpstreamUnavailable(e.to_string()),
            DaoError::BsonSer(e) => SignalingError::Internal(e.to_string()),
            DaoError::BsonDe(e) => SignalingError::Internal(e.to_string()),
        }
    }
}

impl From<meetsfu_services::AdmissionError> for SignalingError {
    fn from(err: meetsfu_services::AdmissionError) -> Self {
        use meetsfu_services::AdmissionError;
        match err {
            AdmissionError::Dao(e) => e.into(),
            AdmissionError::MeetingNotFound => SignalingError::NotFound("meeting".into()),
            AdmissionError::ParticipantNotFound => SignalingError::NotFound("participant".into()),
            AdmissionError::Forbidden(msg) => SignalingError::PermissionDenied(msg),
            AdmissionError::CannotTargetHost => {
                SignalingError::PermissionDenied("cannot target the host".into())
            }
        }
    }
}

impl From<meetsfu_services::BreakoutError> for SignalingError {
    fn from(err: meetsfu_services::BreakoutError) -> Self {
        use meetsfu_services::BreakoutError;
        match err {
            BreakoutError::Dao(e) => e.into(),
            BreakoutError::Room(e) => e.into(),
            BreakoutError::InvalidConfigCount
            | BreakoutError::InvalidName
            | BreakoutError::InvalidDuration => SignalingError::InvalidArgument(err.to_string()),
            BreakoutError::DuplicateParticipant(_) => {
                SignalingError::InvalidArgument(err.to_string())
            }
        }
    }
}
