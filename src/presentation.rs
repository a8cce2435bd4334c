use std::str::FromStr;

use serde_json::{json, Value};

use crate::{
    error::IntentParseError,
    events::EventEmitter,
    protocol::ConnectionRequest,
    relay::{SignalKind, SignalingMessage},
};

/// Local surface that shows prompts and owns the captured media.
///
/// Implementations only observe session state; they change it by sending
/// [`UserIntent`]s back to the agent.
pub trait PresentationSink {
    fn request_received(&mut self, request: &ConnectionRequest);

    /// A pending request became invalid before the user answered it.
    fn request_cancelled(&mut self, request: &ConnectionRequest);

    fn session_started(&mut self, controller_name: &str);

    fn session_ended(&mut self);

    fn signal(&mut self, message: SignalingMessage);

    /// Stop capture and tear down the peer link. May be called repeatedly.
    fn release_resources(&mut self);
}

/// What the local user (or the media engine acting for them) asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum UserIntent {
    Accept,
    Reject { reason: String },
    EndSession,
    /// The prompt or session window was closed without an explicit choice.
    Dismiss,
    Signal { kind: SignalKind, body: Value },
    /// Drop the server connection and stop answering requests.
    Logout,
    Login { token: String },
}

pub const DEFAULT_REJECT_REASON: &str = "declined";

impl FromStr for UserIntent {
    type Err = IntentParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "" => Err(IntentParseError::Empty),
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject {
                reason: if rest.is_empty() {
                    DEFAULT_REJECT_REASON.to_string()
                } else {
                    rest.to_string()
                },
            }),
            "end" => Ok(Self::EndSession),
            "dismiss" => Ok(Self::Dismiss),
            "answer" => parse_signal(SignalKind::Answer, "answer", rest),
            "ice" => parse_signal(SignalKind::IceCandidate, "ice", rest),
            "logout" => Ok(Self::Logout),
            "login" if rest.is_empty() => Err(IntentParseError::MissingPayload("login")),
            "login" => Ok(Self::Login {
                token: rest.to_string(),
            }),
            other => Err(IntentParseError::Unknown(other.to_string())),
        }
    }
}

fn parse_signal(
    kind: SignalKind,
    verb: &'static str,
    rest: &str,
) -> Result<UserIntent, IntentParseError> {
    if rest.is_empty() {
        return Err(IntentParseError::MissingPayload(verb));
    }
    Ok(UserIntent::Signal {
        kind,
        body: serde_json::from_str(rest)?,
    })
}

/// Sink for the headless binary: logs everything and mirrors it as JSON events.
#[derive(Debug, Clone)]
pub struct ConsolePresentation {
    events: EventEmitter,
    capturing: bool,
}

impl ConsolePresentation {
    pub fn new(events: EventEmitter) -> Self {
        Self {
            events,
            capturing: false,
        }
    }
}

impl PresentationSink for ConsolePresentation {
    fn request_received(&mut self, request: &ConnectionRequest) {
        tracing::info!(
            target = "support_agent::presentation",
            controller = %request.controller_name,
            "remote support requested; type 'accept' or 'reject [reason]'"
        );
        self.events.emit("request_received", request);
    }

    fn request_cancelled(&mut self, request: &ConnectionRequest) {
        tracing::info!(
            target = "support_agent::presentation",
            controller = %request.controller_name,
            "remote support request withdrawn"
        );
        self.events.emit("request_cancelled", request);
    }

    fn session_started(&mut self, controller_name: &str) {
        self.capturing = true;
        tracing::info!(
            target = "support_agent::presentation",
            controller = %controller_name,
            "remote support session started; type 'end' to stop"
        );
        self.events.emit(
            "session_started",
            json!({"controllerName": controller_name}),
        );
    }

    fn session_ended(&mut self) {
        tracing::info!(target = "support_agent::presentation", "remote support session ended");
        self.events.emit("session_ended", json!({}));
    }

    fn signal(&mut self, message: SignalingMessage) {
        self.events.emit("signal", &message);
    }

    fn release_resources(&mut self) {
        if !self.capturing {
            return;
        }
        self.capturing = false;
        self.events.emit("resources_released", json!({}));
    }
}
