//! Protocol scenarios driven through the public agent API.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use support_agent::{
    agent::SupportAgent,
    channel::{ChannelEvent, ChannelSink},
    error::ChannelError,
    events::EventEmitter,
    identity::AgentIdentity,
    presentation::{PresentationSink, UserIntent},
    protocol::{ConnectionRequest, OutboundEvent},
    relay::SignalingMessage,
    session::{SessionManager, SessionPhase},
};

#[derive(Clone, Default)]
struct Wire {
    online: Arc<Mutex<bool>>,
    frames: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Wire {
    fn frames(&self) -> Vec<(String, Value)> {
        self.frames.lock().clone()
    }

    fn names(&self) -> Vec<String> {
        self.frames().into_iter().map(|(name, _)| name).collect()
    }
}

impl ChannelSink for Wire {
    fn send(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        if !*self.online.lock() {
            return Err(ChannelError::NoActiveChannel {
                event: event.name(),
            });
        }
        self.frames
            .lock()
            .push((event.name().to_string(), event.payload()));
        Ok(())
    }

    fn sign_out(&self) -> Result<(), ChannelError> {
        *self.online.lock() = false;
        Ok(())
    }

    fn sign_in(&self, _token: String) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Screen {
    signals: Arc<Mutex<Vec<SignalingMessage>>>,
    releases: Arc<Mutex<u32>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl PresentationSink for Screen {
    fn request_received(&mut self, request: &ConnectionRequest) {
        self.prompts.lock().push(request.controller_name.clone());
    }

    fn request_cancelled(&mut self, _request: &ConnectionRequest) {}

    fn session_started(&mut self, _controller_name: &str) {}

    fn session_ended(&mut self) {}

    fn signal(&mut self, message: SignalingMessage) {
        self.signals.lock().push(message);
    }

    fn release_resources(&mut self) {
        *self.releases.lock() += 1;
    }
}

fn setup() -> (SupportAgent<Wire, Screen, AgentIdentity>, Wire, Screen) {
    let wire = Wire::default();
    *wire.online.lock() = true;
    let screen = Screen::default();
    let identity = AgentIdentity {
        id: "desk-7".into(),
        display_name: "Desk 7".into(),
        platform_info: "windows x86_64".into(),
        ip_address: "192.168.1.7".into(),
    };
    let manager = SessionManager::new(wire.clone(), screen.clone(), identity);
    (
        SupportAgent::new(manager, EventEmitter::disabled()),
        wire,
        screen,
    )
}

fn inbound(event: &str, data: Value) -> ChannelEvent {
    ChannelEvent::Message {
        event: event.into(),
        data,
    }
}

fn request(name: &str, socket: &str) -> ChannelEvent {
    inbound(
        "connection-request",
        json!({
            "controllerId": format!("id-{socket}"),
            "controllerName": name,
            "controllerSocketId": socket,
        }),
    )
}

#[test]
fn accept_scenario_reports_resolved_computer_id() {
    let (mut agent, wire, screen) = setup();
    agent.handle_channel_event(request("IT-Bob", "s1"));
    assert_eq!(agent.manager().phase(), SessionPhase::RequestPending);
    assert_eq!(*screen.prompts.lock(), vec!["IT-Bob".to_string()]);

    agent.handle_intent(UserIntent::Accept);
    assert_eq!(agent.manager().phase(), SessionPhase::SessionActive);
    assert_eq!(
        wire.frames(),
        vec![(
            "connection-accepted".to_string(),
            json!({"controllerSocketId": "s1", "computerId": "desk-7"})
        )]
    );
}

#[test]
fn reject_scenario_creates_no_session() {
    let (mut agent, wire, screen) = setup();
    agent.handle_channel_event(request("IT-Bob", "s1"));
    agent.handle_intent(UserIntent::Reject {
        reason: "declined".into(),
    });
    assert_eq!(agent.manager().phase(), SessionPhase::Idle);
    assert!(agent.manager().active_session().is_none());
    assert_eq!(
        wire.frames(),
        vec![(
            "connection-rejected".to_string(),
            json!({"controllerSocketId": "s1", "reason": "declined"})
        )]
    );
    assert_eq!(*screen.releases.lock(), 0);
}

#[test]
fn busy_controller_is_turned_away_and_session_kept() {
    let (mut agent, wire, _) = setup();
    agent.handle_channel_event(request("IT-Bob", "s1"));
    agent.handle_intent(UserIntent::Accept);
    agent.handle_channel_event(request("IT-Eve", "s2"));

    assert_eq!(
        agent.manager().active_session().unwrap().controller_route_id,
        "s1"
    );
    assert_eq!(
        wire.frames().last().unwrap(),
        &(
            "connection-rejected".to_string(),
            json!({"controllerSocketId": "s2", "reason": "busy"})
        )
    );
}

#[test]
fn double_end_sends_once() {
    let (mut agent, wire, screen) = setup();
    agent.handle_channel_event(request("IT-Bob", "s1"));
    agent.handle_intent(UserIntent::Accept);
    agent.handle_intent(UserIntent::EndSession);
    agent.handle_intent(UserIntent::EndSession);
    agent.handle_intent(UserIntent::Dismiss);

    let ends: Vec<_> = wire
        .frames()
        .into_iter()
        .filter(|(name, _)| name == "end-session")
        .collect();
    assert_eq!(ends, vec![("end-session".to_string(), json!({"targetSocketId": "s1"}))]);
    assert_eq!(*screen.releases.lock(), 1);
}

#[test]
fn disconnect_is_hard_cancellation() {
    let (mut agent, wire, screen) = setup();
    agent.handle_channel_event(request("IT-Bob", "s1"));
    agent.handle_intent(UserIntent::Accept);
    *wire.online.lock() = false;
    agent.handle_channel_event(ChannelEvent::Disconnected);

    assert_eq!(agent.manager().phase(), SessionPhase::Idle);
    assert_eq!(*screen.releases.lock(), 1);
    assert_eq!(wire.names(), vec!["connection-accepted"]);

    // A stale intent after the disconnect must not resurrect anything.
    agent.handle_intent(UserIntent::Accept);
    agent.handle_intent(UserIntent::EndSession);
    assert_eq!(agent.manager().phase(), SessionPhase::Idle);
    assert_eq!(wire.names(), vec!["connection-accepted"]);
}

#[test]
fn ice_candidate_is_relayed_unmodified() {
    let (mut agent, _, screen) = setup();
    agent.handle_channel_event(inbound("ice-candidate", json!({"candidate":"early"})));
    agent.handle_channel_event(request("IT-Bob", "s1"));
    agent.handle_intent(UserIntent::Accept);
    agent.handle_channel_event(inbound("ice-candidate", json!({"candidate":"X"})));

    let signals = screen.signals.lock().clone();
    assert_eq!(signals.len(), 1, "pre-session candidates are not buffered");
    assert_eq!(
        serde_json::to_value(&signals[0]).unwrap(),
        json!({"kind": "ice-candidate", "routeId": "s1", "body": {"candidate": "X"}})
    );
}

#[test]
fn reconnect_starts_clean_and_reregisters() {
    let (mut agent, wire, _) = setup();
    agent.handle_channel_event(ChannelEvent::Connected);
    agent.handle_channel_event(request("IT-Bob", "s1"));
    agent.handle_channel_event(ChannelEvent::Disconnected);
    agent.handle_channel_event(ChannelEvent::Connected);

    assert_eq!(agent.manager().phase(), SessionPhase::Idle);
    assert_eq!(wire.names(), vec!["register-agent", "register-agent"]);
    assert_eq!(
        wire.frames()[1].1,
        json!({
            "computerId": "desk-7",
            "computerName": "Desk 7",
            "osInfo": "windows x86_64",
            "ipAddress": "192.168.1.7"
        })
    );
}
