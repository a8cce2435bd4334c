use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

use crate::config::Config;

pub fn init_logging(cfg: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_new(cfg.log_level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(true)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Machine-readable mirror of what the agent does, one JSON line per event:
/// `{"ts": <rfc3339>, "type": <name>, "payload": <value>}`.
#[derive(Clone)]
pub struct EventEmitter {
    out: Option<SharedWriter>,
}

impl EventEmitter {
    /// Emits to stderr when `json_output` is set, otherwise drops everything.
    pub fn new(json_output: bool) -> Self {
        if json_output {
            Self::with_writer(io::stderr())
        } else {
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self { out: None }
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Some(Arc::new(Mutex::new(Box::new(writer)))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    pub fn emit<T: Serialize>(&self, event_type: &str, payload: T) {
        let Some(out) = &self.out else {
            return;
        };

        let line = event_line(event_type, payload);
        let mut out = out.lock();
        if let Err(error) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::debug!(
                target = "support_agent::events",
                event_type,
                error = %error,
                "failed to write event line"
            );
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn event_line<T: Serialize>(event_type: &str, payload: T) -> Value {
    json!({
        "ts": Utc::now().to_rfc3339(),
        "type": event_type,
        "payload": payload,
    })
}
