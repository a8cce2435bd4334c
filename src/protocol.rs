//! Wire contract of the remote-support channel.
//!
//! Inbound `(event, payload)` pairs are decoded into the closed [`InboundEvent`]
//! set; anything else is refused with [`ProtocolError::UnknownEvent`]. Missing
//! optional fields are defaulted here so the session manager never sees them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{error::ProtocolError, identity::AgentIdentity};

pub const REGISTER_AGENT: &str = "register-agent";
pub const CONNECTION_REQUEST: &str = "connection-request";
pub const CONNECTION_ACCEPTED: &str = "connection-accepted";
pub const CONNECTION_REJECTED: &str = "connection-rejected";
pub const END_SESSION: &str = "end-session";
pub const SESSION_ENDED: &str = "session-ended";
pub const WEBRTC_OFFER: &str = "webrtc-offer";
pub const WEBRTC_ANSWER: &str = "webrtc-answer";
pub const ICE_CANDIDATE: &str = "ice-candidate";

pub const DEFAULT_CONTROLLER_NAME: &str = "Unknown controller";
pub const DEFAULT_CONTROLLER_ID: &str = "unknown";

/// Reply reason sent to a controller whose request collides with existing work.
pub const BUSY_REASON: &str = "busy";
/// Reject reason used when the prompt is closed without an explicit answer.
pub const DISMISSED_REASON: &str = "dismissed-by-user";

/// A controller asking to take over this agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConnectionRequest")]
pub struct ConnectionRequest {
    #[serde(rename = "controllerId")]
    pub controller_id: String,
    #[serde(rename = "controllerName")]
    pub controller_name: String,
    #[serde(rename = "controllerSocketId")]
    pub controller_socket_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConnectionRequest {
    #[serde(default)]
    controller_id: Option<String>,
    #[serde(default)]
    controller_name: Option<String>,
    #[serde(default)]
    controller_socket_id: Option<String>,
}

impl TryFrom<RawConnectionRequest> for ConnectionRequest {
    type Error = String;

    fn try_from(raw: RawConnectionRequest) -> Result<Self, Self::Error> {
        let controller_socket_id =
            non_blank(raw.controller_socket_id).ok_or("missing controllerSocketId")?;
        Ok(Self {
            controller_id: non_blank(raw.controller_id)
                .unwrap_or_else(|| DEFAULT_CONTROLLER_ID.to_string()),
            controller_name: non_blank(raw.controller_name)
                .unwrap_or_else(|| DEFAULT_CONTROLLER_NAME.to_string()),
            controller_socket_id,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Server → agent events the core reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ConnectionRequest(ConnectionRequest),
    WebrtcOffer(Value),
    IceCandidate(Value),
    SessionEnded,
}

impl InboundEvent {
    pub fn decode(event: &str, data: Value) -> Result<Self, ProtocolError> {
        match event {
            CONNECTION_REQUEST => serde_json::from_value(data)
                .map(Self::ConnectionRequest)
                .map_err(|source| ProtocolError::Malformed {
                    event: CONNECTION_REQUEST,
                    source,
                }),
            WEBRTC_OFFER => Ok(Self::WebrtcOffer(data)),
            ICE_CANDIDATE => Ok(Self::IceCandidate(data)),
            SESSION_ENDED => Ok(Self::SessionEnded),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionRequest(_) => CONNECTION_REQUEST,
            Self::WebrtcOffer(_) => WEBRTC_OFFER,
            Self::IceCandidate(_) => ICE_CANDIDATE,
            Self::SessionEnded => SESSION_ENDED,
        }
    }
}

/// Agent → server events.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    RegisterAgent(AgentIdentity),
    ConnectionAccepted {
        controller_socket_id: String,
        computer_id: String,
    },
    ConnectionRejected {
        controller_socket_id: String,
        reason: String,
    },
    EndSession {
        target_socket_id: String,
    },
    WebrtcAnswer {
        target_socket_id: String,
        answer: Value,
    },
    IceCandidate {
        target_socket_id: String,
        candidate: Value,
    },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterAgent(_) => REGISTER_AGENT,
            Self::ConnectionAccepted { .. } => CONNECTION_ACCEPTED,
            Self::ConnectionRejected { .. } => CONNECTION_REJECTED,
            Self::EndSession { .. } => END_SESSION,
            Self::WebrtcAnswer { .. } => WEBRTC_ANSWER,
            Self::IceCandidate { .. } => ICE_CANDIDATE,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::RegisterAgent(identity) => json!(identity),
            Self::ConnectionAccepted {
                controller_socket_id,
                computer_id,
            } => json!({
                "controllerSocketId": controller_socket_id,
                "computerId": computer_id,
            }),
            Self::ConnectionRejected {
                controller_socket_id,
                reason,
            } => json!({
                "controllerSocketId": controller_socket_id,
                "reason": reason,
            }),
            Self::EndSession { target_socket_id } => json!({
                "targetSocketId": target_socket_id,
            }),
            Self::WebrtcAnswer {
                target_socket_id,
                answer,
            } => json!({
                "targetSocketId": target_socket_id,
                "answer": answer,
            }),
            Self::IceCandidate {
                target_socket_id,
                candidate,
            } => json!({
                "targetSocketId": target_socket_id,
                "candidate": candidate,
            }),
        }
    }
}

/// One text frame on the websocket: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl From<&OutboundEvent> for ChannelFrame {
    fn from(event: &OutboundEvent) -> Self {
        Self {
            event: event.name().to_string(),
            data: event.payload(),
        }
    }
}
