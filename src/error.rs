//! Error types for the support agent.

use thiserror::Error;

use crate::{relay::SignalKind, session::SessionPhase};

/// Errors raised by the channel session transport.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// An outbound event was attempted while the channel is disconnected.
    #[error("no active channel; dropped outbound '{event}'")]
    NoActiveChannel {
        /// Wire name of the dropped event.
        event: &'static str,
    },

    /// The transport task is gone.
    #[error("channel transport has shut down")]
    Closed,

    /// The server URL could not be turned into a websocket endpoint.
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors raised while decoding inbound channel events.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The event name is not part of the remote-support contract.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    /// The payload did not match the expected shape.
    #[error("malformed '{event}' payload: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by session state transitions. None of these are fatal.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The action has no matching request or session in the current phase.
    #[error("{action} is not valid while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: SessionPhase,
    },

    /// A second request arrived while one is pending or a session is active.
    #[error("rejected request from '{controller_socket_id}': agent is {phase}")]
    ConcurrentRequestRejected {
        controller_socket_id: String,
        phase: SessionPhase,
    },

    /// The agent never originates this kind of signaling message.
    #[error("agent does not send '{0}' signals")]
    UnsupportedSignal(SignalKind),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl SessionError {
    /// Check if this error only reports a no-op transition.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// A console line that does not name a known intent.
#[derive(Error, Debug)]
pub enum IntentParseError {
    #[error("empty input")]
    Empty,

    #[error("unknown intent '{0}'")]
    Unknown(String),

    #[error("'{0}' requires a JSON payload")]
    MissingPayload(&'static str),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}
