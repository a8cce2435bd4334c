use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::{
    error::ChannelError,
    protocol::{ChannelFrame, OutboundEvent},
};

pub const DEFAULT_STREAM_PATH: &str = "/agent/ws";

/// Lifecycle signals and inbound traffic of the channel session.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message { event: String, data: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelControl {
    Shutdown,
    SignOut,
    SignIn(String),
}

/// Outbound half of the channel session as seen by the session manager.
pub trait ChannelSink {
    /// Queue an event for the server. Fails fast when there is no connection.
    fn send(&self, event: OutboundEvent) -> Result<(), ChannelError>;

    /// Drop the connection and stay offline until [`ChannelSink::sign_in`].
    fn sign_out(&self) -> Result<(), ChannelError>;

    /// Reconnect right away with a new token.
    fn sign_in(&self, token: String) -> Result<(), ChannelError>;
}

/// Cloneable handle onto a running [`WsChannel`].
#[derive(Clone)]
pub struct ChannelHandle {
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    control_tx: mpsc::UnboundedSender<ChannelControl>,
    connected: Arc<AtomicBool>,
}

impl ChannelHandle {
    /// Stop the connection loop for good.
    pub fn disconnect(&self) {
        let _ = self.control_tx.send(ChannelControl::Shutdown);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn control(&self, control: ChannelControl) -> Result<(), ChannelError> {
        self.control_tx
            .send(control)
            .map_err(|_| ChannelError::Closed)
    }
}

impl ChannelSink for ChannelHandle {
    fn send(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NoActiveChannel {
                event: event.name(),
            });
        }
        self.outbound_tx
            .send(event)
            .map_err(|_| ChannelError::Closed)
    }

    fn sign_out(&self) -> Result<(), ChannelError> {
        self.control(ChannelControl::SignOut)
    }

    fn sign_in(&self, token: String) -> Result<(), ChannelError> {
        self.control(ChannelControl::SignIn(token))
    }
}

/// Authenticated websocket to the support server with automatic reconnect.
#[derive(Clone)]
pub struct WsChannel {
    base_url: String,
    token: Arc<Mutex<String>>,
    connected: Arc<AtomicBool>,
}

impl WsChannel {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: Arc::new(Mutex::new(token.into())),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the token used for subsequent reconnect attempts.
    fn set_token(&self, token: impl Into<String>) {
        *self.token.lock() = token.into();
    }

    /// Start the connection loop on the current runtime.
    pub fn connect(self) -> Result<(ChannelHandle, mpsc::Receiver<ChannelEvent>), ChannelError> {
        build_ws_url(&self.base_url, &self.token.lock())?;

        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = ChannelHandle {
            outbound_tx,
            control_tx,
            connected: self.connected.clone(),
        };

        tokio::spawn(async move {
            self.run(inbound_tx, outbound_rx, control_rx).await;
        });

        Ok((handle, inbound_rx))
    }

    pub async fn run(
        &self,
        inbound_tx: mpsc::Sender<ChannelEvent>,
        mut outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>,
        mut control_rx: mpsc::UnboundedReceiver<ChannelControl>,
    ) {
        let mut attempt = 0u32;
        let mut signed_out = false;

        'outer: loop {
            if signed_out {
                match control_rx.recv().await {
                    Some(ChannelControl::SignIn(token)) => {
                        self.set_token(token);
                        signed_out = false;
                        attempt = 0;
                        tracing::info!(target = "support_agent::channel", "signed in; reconnecting");
                    }
                    Some(ChannelControl::SignOut) => continue,
                    Some(ChannelControl::Shutdown) | None => break,
                }
            }

            let token = self.token.lock().clone();
            let ws_url = match build_ws_url(&self.base_url, &token) {
                Ok(url) => url,
                Err(error) => {
                    tracing::warn!(
                        target = "support_agent::channel",
                        base_url = %self.base_url,
                        error = %error,
                        "invalid websocket base url"
                    );
                    break;
                }
            };
            let ws_endpoint = ws_url
                .split_once('?')
                .map(|(prefix, _)| prefix)
                .unwrap_or(&ws_url)
                .to_string();

            match tokio_tungstenite::connect_async(ws_url.as_str()).await {
                Ok((ws, _)) => {
                    attempt = 0;
                    self.connected.store(true, Ordering::SeqCst);
                    tracing::info!(
                        target = "support_agent::channel",
                        endpoint = %ws_endpoint,
                        "channel connected"
                    );
                    if inbound_tx.send(ChannelEvent::Connected).await.is_err() {
                        self.connected.store(false, Ordering::SeqCst);
                        break;
                    }

                    let (mut write, mut read) = ws.split();
                    let mut shutdown = false;
                    let mut token_changed = false;
                    loop {
                        tokio::select! {
                            ctrl = control_rx.recv() => {
                                match ctrl {
                                    Some(ChannelControl::Shutdown) | None => shutdown = true,
                                    Some(ChannelControl::SignOut) => signed_out = true,
                                    Some(ChannelControl::SignIn(token)) => {
                                        self.set_token(token);
                                        token_changed = true;
                                    }
                                }
                                let _ = write.close().await;
                                break;
                            }
                            outbound = outbound_rx.recv() => {
                                let Some(event) = outbound else {
                                    let _ = write.close().await;
                                    shutdown = true;
                                    break;
                                };
                                let text = match serde_json::to_string(&ChannelFrame::from(&event)) {
                                    Ok(text) => text,
                                    Err(error) => {
                                        tracing::warn!(target = "support_agent::channel", event = event.name(), error = %error, "failed to encode frame");
                                        continue;
                                    }
                                };
                                if let Err(error) = write.send(Message::Text(text)).await {
                                    tracing::warn!(target = "support_agent::channel", event = event.name(), error = %error, "ws write failed");
                                    break;
                                }
                            }
                            frame = read.next() => {
                                match frame {
                                    Some(Ok(Message::Text(text))) => {
                                        match serde_json::from_str::<ChannelFrame>(&text) {
                                            Ok(frame) => {
                                                let event = ChannelEvent::Message {
                                                    event: frame.event,
                                                    data: frame.data,
                                                };
                                                if inbound_tx.send(event).await.is_err() {
                                                    shutdown = true;
                                                    break;
                                                }
                                            }
                                            Err(_) => {
                                                tracing::debug!(
                                                    target = "support_agent::channel",
                                                    raw = %text,
                                                    "ignoring non-frame text message"
                                                );
                                            }
                                        }
                                    }
                                    Some(Ok(Message::Binary(_))) => {}
                                    Some(Ok(Message::Close(_))) | None => {
                                        break;
                                    }
                                    Some(Err(error)) => {
                                        tracing::warn!(target = "support_agent::channel", error = %error, "ws read error");
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }

                    self.connected.store(false, Ordering::SeqCst);
                    let dropped = drain_stale(&mut outbound_rx);
                    if dropped > 0 {
                        tracing::debug!(
                            target = "support_agent::channel",
                            dropped,
                            "discarded outbound events queued before disconnect"
                        );
                    }
                    tracing::info!(target = "support_agent::channel", "channel disconnected");
                    let _ = inbound_tx.send(ChannelEvent::Disconnected).await;

                    if shutdown {
                        break;
                    }
                    if signed_out || token_changed {
                        continue;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        target = "support_agent::channel",
                        endpoint = %ws_endpoint,
                        error = %error,
                        "ws connect failed"
                    );
                }
            }

            attempt += 1;
            let delay = tokio::time::sleep(reconnect_delay(attempt));
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    ctrl = control_rx.recv() => {
                        match ctrl {
                            Some(ChannelControl::Shutdown) | None => break 'outer,
                            Some(ChannelControl::SignOut) => {
                                signed_out = true;
                                break;
                            }
                            Some(ChannelControl::SignIn(token)) => {
                                self.set_token(token);
                                attempt = 0;
                                break;
                            }
                        }
                    }
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(event) => {
                                tracing::debug!(target = "support_agent::channel", event = event.name(), "dropping outbound event while offline");
                            }
                            None => break 'outer,
                        }
                    }
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
    }
}

fn drain_stale(outbound_rx: &mut mpsc::UnboundedReceiver<OutboundEvent>) -> usize {
    let mut dropped = 0;
    while outbound_rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

pub fn build_ws_url(base_url: &str, token: &str) -> Result<String, ChannelError> {
    let raw = base_url.trim();
    let normalized = if raw.starts_with("wss://") || raw.starts_with("ws://") {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("wss://{raw}")
    };

    let mut url = Url::parse(&normalized)?;
    let path = url.path().trim_end_matches('/').to_string();
    if path.is_empty() {
        url.set_path(DEFAULT_STREAM_PATH);
    }

    let preserved: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in preserved {
            pairs.append_pair(&k, &v);
        }
        pairs.append_pair("token", token);
    }

    Ok(url.to_string())
}

pub fn reconnect_delay(attempt: u32) -> Duration {
    let base_ms = (1_000u64).saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let bounded = base_ms.min(30_000);
    let jitter = rand::thread_rng().gen_range(0..=250);
    Duration::from_millis(bounded + jitter)
}
