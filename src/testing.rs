//! In-memory collaborators for unit tests.

use std::{
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    channel::{ChannelControl, ChannelSink},
    error::ChannelError,
    events::EventEmitter,
    identity::AgentIdentity,
    presentation::PresentationSink,
    protocol::{ConnectionRequest, OutboundEvent},
    relay::SignalingMessage,
};

#[derive(Default)]
struct ChannelLog {
    connected: bool,
    sent: Vec<OutboundEvent>,
    attempted: Vec<OutboundEvent>,
    controls: Vec<ChannelControl>,
}

/// Channel that records what would have gone over the wire.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    log: Arc<Mutex<ChannelLog>>,
}

impl RecordingChannel {
    pub fn connected() -> Self {
        let channel = Self::default();
        channel.set_connected(true);
        channel
    }

    pub fn set_connected(&self, connected: bool) {
        self.log.lock().connected = connected;
    }

    pub fn sent(&self) -> Vec<OutboundEvent> {
        self.log.lock().sent.clone()
    }

    pub fn attempted(&self) -> Vec<OutboundEvent> {
        self.log.lock().attempted.clone()
    }

    pub fn controls(&self) -> Vec<ChannelControl> {
        self.log.lock().controls.clone()
    }

    pub fn clear(&self) {
        let mut log = self.log.lock();
        log.sent.clear();
        log.attempted.clear();
    }
}

impl ChannelSink for RecordingChannel {
    fn send(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        let mut log = self.log.lock();
        log.attempted.push(event.clone());
        if !log.connected {
            return Err(ChannelError::NoActiveChannel {
                event: event.name(),
            });
        }
        log.sent.push(event);
        Ok(())
    }

    fn sign_out(&self) -> Result<(), ChannelError> {
        let mut log = self.log.lock();
        log.connected = false;
        log.controls.push(ChannelControl::SignOut);
        Ok(())
    }

    fn sign_in(&self, token: String) -> Result<(), ChannelError> {
        self.log.lock().controls.push(ChannelControl::SignIn(token));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Note {
    RequestReceived(String),
    RequestCancelled(String),
    SessionStarted(String),
    SessionEnded,
    Signal(SignalingMessage),
    Released,
}

#[derive(Clone, Default)]
pub struct RecordingPresentation {
    notes: Arc<Mutex<Vec<Note>>>,
}

impl RecordingPresentation {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().clone()
    }

    pub fn clear(&self) {
        self.notes.lock().clear();
    }
}

impl PresentationSink for RecordingPresentation {
    fn request_received(&mut self, request: &ConnectionRequest) {
        self.notes
            .lock()
            .push(Note::RequestReceived(request.controller_socket_id.clone()));
    }

    fn request_cancelled(&mut self, request: &ConnectionRequest) {
        self.notes
            .lock()
            .push(Note::RequestCancelled(request.controller_socket_id.clone()));
    }

    fn session_started(&mut self, controller_name: &str) {
        self.notes
            .lock()
            .push(Note::SessionStarted(controller_name.to_string()));
    }

    fn session_ended(&mut self) {
        self.notes.lock().push(Note::SessionEnded);
    }

    fn signal(&mut self, message: SignalingMessage) {
        self.notes.lock().push(Note::Signal(message));
    }

    fn release_resources(&mut self) {
        self.notes.lock().push(Note::Released);
    }
}

pub fn fixed_identity() -> AgentIdentity {
    AgentIdentity {
        id: "pc-01".into(),
        display_name: "Reception".into(),
        platform_info: "linux x86_64".into(),
        ip_address: "10.0.0.4".into(),
    }
}

pub fn request(id: &str, name: &str, socket_id: &str) -> ConnectionRequest {
    ConnectionRequest {
        controller_id: id.into(),
        controller_name: name.into(),
        controller_socket_id: socket_id.into(),
    }
}

/// Shared buffer behind an [`EventEmitter`] built by [`captured_events`].
#[derive(Clone, Default)]
pub struct EventCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl EventCapture {
    pub fn lines(&self) -> Vec<Value> {
        String::from_utf8_lossy(&self.buf.lock())
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn types(&self) -> Vec<String> {
        self.lines()
            .iter()
            .map(|line| line["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl Write for EventCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn captured_events() -> (EventEmitter, EventCapture) {
    let capture = EventCapture::default();
    (EventEmitter::with_writer(capture.clone()), capture)
}
