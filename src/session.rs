//! Single-flight remote-support session state machine.
//!
//! The agent holds at most one pending [`ConnectionRequest`] or one active
//! [`Session`], never both. Every exit from a session goes through
//! [`SessionManager::release_session_resources`], which releases the
//! presentation's media at most once per session.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    channel::ChannelSink,
    error::{ChannelError, SessionError},
    identity::{AgentIdentity, IdentityProvider},
    presentation::PresentationSink,
    protocol::{ConnectionRequest, OutboundEvent, BUSY_REASON, DISMISSED_REASON},
    relay::{relay_inbound, relay_outbound, SignalKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub controller_id: String,
    pub controller_name: String,
    pub controller_route_id: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    fn from_request(request: ConnectionRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            controller_id: request.controller_id,
            controller_name: request.controller_name,
            controller_route_id: request.controller_socket_id,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    RequestPending(ConnectionRequest),
    SessionActive(Session),
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Idle => SessionPhase::Idle,
            Self::RequestPending(_) => SessionPhase::RequestPending,
            Self::SessionActive(_) => SessionPhase::SessionActive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    RequestPending,
    SessionActive,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestPending => "request_pending",
            Self::SessionActive => "session_active",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SessionManager<C, P, I> {
    state: SessionState,
    channel: C,
    presentation: P,
    identity: I,
    resources_held: bool,
}

impl<C, P, I> SessionManager<C, P, I>
where
    C: ChannelSink,
    P: PresentationSink,
    I: IdentityProvider,
{
    pub fn new(channel: C, presentation: P, identity: I) -> Self {
        Self {
            state: SessionState::Idle,
            channel,
            presentation,
            identity,
            resources_held: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn pending_request(&self) -> Option<&ConnectionRequest> {
        match &self.state {
            SessionState::RequestPending(request) => Some(request),
            _ => None,
        }
    }

    pub fn active_session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::SessionActive(session) => Some(session),
            _ => None,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    /// Announce this agent to the server. Fire-and-forget; safe to repeat.
    pub fn register(&mut self) -> Result<AgentIdentity, SessionError> {
        let identity = self.identity.resolve();
        self.channel.send(OutboundEvent::RegisterAgent(identity.clone()))?;
        tracing::info!(
            target = "support_agent::session",
            computer_id = %identity.id,
            computer_name = %identity.display_name,
            ip = %identity.ip_address,
            "registered agent"
        );
        Ok(identity)
    }

    pub fn handle_request(&mut self, request: ConnectionRequest) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Idle) {
            let phase = self.phase();
            tracing::info!(
                target = "support_agent::session",
                controller = %request.controller_name,
                route_id = %request.controller_socket_id,
                phase = %phase,
                "refusing concurrent support request"
            );
            self.send_or_log(OutboundEvent::ConnectionRejected {
                controller_socket_id: request.controller_socket_id.clone(),
                reason: BUSY_REASON.to_string(),
            });
            return Err(SessionError::ConcurrentRequestRejected {
                controller_socket_id: request.controller_socket_id,
                phase,
            });
        }

        tracing::info!(
            target = "support_agent::session",
            controller = %request.controller_name,
            route_id = %request.controller_socket_id,
            "support request pending"
        );
        self.state = SessionState::RequestPending(request);
        if let SessionState::RequestPending(request) = &self.state {
            self.presentation.request_received(request);
        }
        Ok(())
    }

    pub fn accept(&mut self) -> Result<(), SessionError> {
        let request = self.take_request("accept")?;
        let identity = self.identity.resolve();

        if let Err(error) = self.channel.send(OutboundEvent::ConnectionAccepted {
            controller_socket_id: request.controller_socket_id.clone(),
            computer_id: identity.id,
        }) {
            tracing::warn!(
                target = "support_agent::session",
                route_id = %request.controller_socket_id,
                error = %error,
                "could not deliver acceptance; dropping request"
            );
            self.presentation.request_cancelled(&request);
            return Err(error.into());
        }

        let session = Session::from_request(request);
        tracing::info!(
            target = "support_agent::session",
            session_id = %session.id,
            controller = %session.controller_name,
            route_id = %session.controller_route_id,
            "support session started"
        );
        self.resources_held = true;
        self.state = SessionState::SessionActive(session);
        if let SessionState::SessionActive(session) = &self.state {
            self.presentation.session_started(&session.controller_name);
        }
        Ok(())
    }

    pub fn reject(&mut self, reason: &str) -> Result<(), SessionError> {
        let request = self.take_request("reject")?;
        tracing::info!(
            target = "support_agent::session",
            route_id = %request.controller_socket_id,
            reason = %reason,
            "support request rejected"
        );
        self.send_or_log(OutboundEvent::ConnectionRejected {
            controller_socket_id: request.controller_socket_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// The prompt or session window went away without an explicit answer.
    pub fn dismiss(&mut self) -> Result<(), SessionError> {
        match self.phase() {
            SessionPhase::RequestPending => self.reject(DISMISSED_REASON),
            SessionPhase::SessionActive => self.end_session(),
            SessionPhase::Idle => {
                self.release_session_resources();
                Ok(())
            }
        }
    }

    /// Local end: release media and tell the controller.
    pub fn end_session(&mut self) -> Result<(), SessionError> {
        let session = self.take_session("end_session")?;
        self.release_session_resources();
        self.send_or_log(OutboundEvent::EndSession {
            target_socket_id: session.controller_route_id.clone(),
        });
        log_session_closed(&session, "local");
        Ok(())
    }

    /// Remote end: release media and notify locally, no echo to the server.
    pub fn remote_session_ended(&mut self) -> Result<(), SessionError> {
        let session = self.take_session("session_ended")?;
        self.release_session_resources();
        self.presentation.session_ended();
        log_session_closed(&session, "remote");
        Ok(())
    }

    /// Hard cancellation of anything in flight. Sends nothing.
    pub fn channel_disconnected(&mut self) {
        match std::mem::take(&mut self.state) {
            SessionState::Idle => {}
            SessionState::RequestPending(request) => {
                tracing::info!(
                    target = "support_agent::session",
                    route_id = %request.controller_socket_id,
                    "channel lost; pending request cancelled"
                );
                self.presentation.request_cancelled(&request);
            }
            SessionState::SessionActive(session) => {
                self.release_session_resources();
                self.presentation.session_ended();
                log_session_closed(&session, "disconnect");
            }
        }
        self.release_session_resources();
    }

    pub fn relay_inbound_signal(
        &mut self,
        kind: SignalKind,
        body: Value,
    ) -> Result<(), SessionError> {
        match &self.state {
            SessionState::SessionActive(session) => {
                relay_inbound(
                    &mut self.presentation,
                    kind,
                    &session.controller_route_id,
                    body,
                );
                Ok(())
            }
            _ => {
                tracing::debug!(
                    target = "support_agent::session",
                    kind = %kind,
                    phase = %self.phase(),
                    "discarding signal outside a session"
                );
                Err(SessionError::InvalidTransition {
                    action: kind.event_name(),
                    phase: self.phase(),
                })
            }
        }
    }

    pub fn send_signal(&mut self, kind: SignalKind, body: Value) -> Result<(), SessionError> {
        let SessionState::SessionActive(session) = &self.state else {
            return Err(self.invalid_transition(kind.event_name()));
        };
        match relay_outbound(&self.channel, kind, &session.controller_route_id, body) {
            Err(SessionError::Channel(ChannelError::NoActiveChannel { event })) => {
                tracing::debug!(
                    target = "support_agent::session",
                    event,
                    "channel offline; signal dropped"
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Release the active session's media. Idempotent.
    pub fn release_session_resources(&mut self) -> bool {
        if !self.resources_held {
            return false;
        }
        self.resources_held = false;
        self.presentation.release_resources();
        tracing::debug!(target = "support_agent::session", "session resources released");
        true
    }

    fn take_request(&mut self, action: &'static str) -> Result<ConnectionRequest, SessionError> {
        match std::mem::take(&mut self.state) {
            SessionState::RequestPending(request) => Ok(request),
            other => {
                self.state = other;
                Err(self.invalid_transition(action))
            }
        }
    }

    fn take_session(&mut self, action: &'static str) -> Result<Session, SessionError> {
        match std::mem::take(&mut self.state) {
            SessionState::SessionActive(session) => Ok(session),
            other => {
                self.state = other;
                Err(self.invalid_transition(action))
            }
        }
    }

    fn invalid_transition(&self, action: &'static str) -> SessionError {
        let phase = self.phase();
        tracing::debug!(
            target = "support_agent::session",
            action,
            phase = %phase,
            "ignoring invalid transition"
        );
        SessionError::InvalidTransition { action, phase }
    }

    fn send_or_log(&self, event: OutboundEvent) -> bool {
        match self.channel.send(event) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    target = "support_agent::session",
                    error = %error,
                    "outbound event dropped"
                );
                false
            }
        }
    }
}

fn log_session_closed(session: &Session, cause: &str) {
    let duration_secs = (Utc::now() - session.started_at).num_seconds();
    tracing::info!(
        target = "support_agent::session",
        session_id = %session.id,
        route_id = %session.controller_route_id,
        cause,
        duration_secs,
        "support session closed"
    );
}
