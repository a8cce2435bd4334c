//! Pass-through for offer / answer / ICE signaling.
//!
//! Bodies belong to the media engine and are never inspected here.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    channel::ChannelSink,
    error::SessionError,
    presentation::PresentationSink,
    protocol::{OutboundEvent, ICE_CANDIDATE, WEBRTC_ANSWER, WEBRTC_OFFER},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }

    pub fn event_name(self) -> &'static str {
        match self {
            Self::Offer => WEBRTC_OFFER,
            Self::Answer => WEBRTC_ANSWER,
            Self::IceCandidate => ICE_CANDIDATE,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    pub kind: SignalKind,
    #[serde(rename = "routeId")]
    pub route_id: String,
    pub body: Value,
}

/// Hand an inbound signal to the presentation sink, tagged with its route.
pub fn relay_inbound<P: PresentationSink + ?Sized>(
    sink: &mut P,
    kind: SignalKind,
    route_id: &str,
    body: Value,
) {
    tracing::trace!(
        target = "support_agent::relay",
        kind = %kind,
        route_id = %route_id,
        "relaying inbound signal"
    );
    sink.signal(SignalingMessage {
        kind,
        route_id: route_id.to_string(),
        body,
    });
}

/// Build the outbound event for a locally produced signal.
///
/// Returns `None` for offers: the agent only ever answers.
pub fn outbound_signal(kind: SignalKind, route_id: &str, body: Value) -> Option<OutboundEvent> {
    let target_socket_id = route_id.to_string();
    match kind {
        SignalKind::Answer => Some(OutboundEvent::WebrtcAnswer {
            target_socket_id,
            answer: body,
        }),
        SignalKind::IceCandidate => Some(OutboundEvent::IceCandidate {
            target_socket_id,
            candidate: body,
        }),
        SignalKind::Offer => None,
    }
}

/// Send a locally produced signal to the controller. One attempt, no retry.
pub fn relay_outbound<C: ChannelSink + ?Sized>(
    channel: &C,
    kind: SignalKind,
    route_id: &str,
    body: Value,
) -> Result<(), SessionError> {
    let event =
        outbound_signal(kind, route_id, body).ok_or(SessionError::UnsupportedSignal(kind))?;
    channel.send(event)?;
    Ok(())
}
