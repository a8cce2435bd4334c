//! Event loop tying the channel, the session manager and local intents together.

use serde_json::json;
use tokio::sync::mpsc;

use crate::{
    channel::{ChannelEvent, ChannelSink},
    error::{ProtocolError, SessionError},
    events::EventEmitter,
    identity::IdentityProvider,
    presentation::{PresentationSink, UserIntent},
    protocol::InboundEvent,
    relay::SignalKind,
    session::SessionManager,
};

pub struct SupportAgent<C, P, I> {
    manager: SessionManager<C, P, I>,
    events: EventEmitter,
    authenticated: bool,
}

impl<C, P, I> SupportAgent<C, P, I>
where
    C: ChannelSink,
    P: PresentationSink,
    I: IdentityProvider,
{
    pub fn new(manager: SessionManager<C, P, I>, events: EventEmitter) -> Self {
        Self {
            manager,
            events,
            authenticated: true,
        }
    }

    pub fn manager(&self) -> &SessionManager<C, P, I> {
        &self.manager
    }

    /// Process events until the channel goes away. Each event is handled to
    /// completion before the next one is taken, and queued channel events
    /// always go before local intents so a disconnect is never overtaken.
    pub async fn run(
        mut self,
        mut channel_rx: mpsc::Receiver<ChannelEvent>,
        mut intent_rx: mpsc::Receiver<UserIntent>,
    ) -> Self {
        let mut intents_open = true;
        loop {
            tokio::select! {
                biased;

                event = channel_rx.recv() => {
                    match event {
                        Some(event) => self.handle_channel_event(event),
                        None => break,
                    }
                }
                intent = intent_rx.recv(), if intents_open => {
                    match intent {
                        Some(intent) => self.handle_intent(intent),
                        None => intents_open = false,
                    }
                }
            }
        }

        // The transport is gone for good; nothing may outlive it.
        self.manager.channel_disconnected();
        self
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.events.emit("connection", json!({"status": "online"}));
                if !self.authenticated {
                    tracing::debug!(
                        target = "support_agent::agent",
                        "connected while signed out; skipping registration"
                    );
                    return;
                }
                if let Err(error) = self.manager.register() {
                    tracing::warn!(
                        target = "support_agent::agent",
                        error = %error,
                        "agent registration failed"
                    );
                }
            }
            ChannelEvent::Disconnected => {
                self.events.emit("connection", json!({"status": "offline"}));
                self.manager.channel_disconnected();
            }
            ChannelEvent::Message { event, .. } if !self.authenticated => {
                tracing::debug!(
                    target = "support_agent::agent",
                    event = %event,
                    "signed out; dropping channel event"
                );
            }
            ChannelEvent::Message { event, data } => match InboundEvent::decode(&event, data) {
                Ok(inbound) => self.dispatch(inbound),
                Err(ProtocolError::UnknownEvent(name)) => {
                    tracing::debug!(
                        target = "support_agent::agent",
                        event = %name,
                        "ignoring event outside the support protocol"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        target = "support_agent::agent",
                        error = %error,
                        "dropping malformed channel event"
                    );
                }
            },
        }
    }

    pub fn handle_intent(&mut self, intent: UserIntent) {
        let result = match intent {
            UserIntent::Accept => self.manager.accept(),
            UserIntent::Reject { reason } => self.manager.reject(&reason),
            UserIntent::EndSession => self.manager.end_session(),
            UserIntent::Dismiss => self.manager.dismiss(),
            UserIntent::Signal { kind, body } => self.manager.send_signal(kind, body),
            UserIntent::Logout => {
                self.sign_out();
                return;
            }
            UserIntent::Login { token } => {
                self.sign_in(token);
                return;
            }
        };
        report("intent", result);
    }

    fn sign_out(&mut self) {
        if !self.authenticated {
            tracing::debug!(target = "support_agent::agent", "already signed out");
            return;
        }
        self.authenticated = false;
        // Nothing from this login may outlive it.
        self.manager.channel_disconnected();
        if let Err(error) = self.manager.channel().sign_out() {
            tracing::warn!(target = "support_agent::agent", error = %error, "sign-out failed");
        }
        tracing::info!(target = "support_agent::agent", "signed out");
        self.events.emit("auth", json!({"status": "signed_out"}));
    }

    fn sign_in(&mut self, token: String) {
        self.authenticated = true;
        if let Err(error) = self.manager.channel().sign_in(token) {
            tracing::warn!(target = "support_agent::agent", error = %error, "sign-in failed");
            return;
        }
        tracing::info!(target = "support_agent::agent", "signed in");
        self.events.emit("auth", json!({"status": "signed_in"}));
    }

    fn dispatch(&mut self, inbound: InboundEvent) {
        let name = inbound.name();
        let result = match inbound {
            InboundEvent::ConnectionRequest(request) => self.manager.handle_request(request),
            InboundEvent::WebrtcOffer(body) => {
                self.manager.relay_inbound_signal(SignalKind::Offer, body)
            }
            InboundEvent::IceCandidate(body) => self
                .manager
                .relay_inbound_signal(SignalKind::IceCandidate, body),
            InboundEvent::SessionEnded => self.manager.remote_session_ended(),
        };
        report(name, result);
    }
}

fn report(source: &str, result: Result<(), SessionError>) {
    match result {
        Ok(()) => {}
        Err(error) if error.is_invalid_transition() => {
            tracing::debug!(target = "support_agent::agent", source, error = %error, "no-op");
        }
        Err(SessionError::ConcurrentRequestRejected { .. }) => {}
        Err(error) => {
            tracing::warn!(target = "support_agent::agent", source, error = %error, "handling failed");
        }
    }
}
