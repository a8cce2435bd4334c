use anyhow::{Context, Result};
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

use support_agent::{
    agent::SupportAgent,
    channel::WsChannel,
    config::{Config, TOKEN_ENV},
    events::{init_logging, EventEmitter},
    identity::SystemIdentity,
    presentation::{ConsolePresentation, UserIntent},
    session::SessionManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::parse();
    init_logging(&cfg)?;

    let token = cfg
        .resolve_token()
        .with_context(|| format!("no auth token; pass --token or set {TOKEN_ENV}"))?;

    let events = EventEmitter::new(cfg.json_output);
    let (channel, channel_rx) = WsChannel::new(cfg.server_url.clone(), token)
        .connect()
        .context("failed to start channel session")?;

    let manager = SessionManager::new(
        channel.clone(),
        ConsolePresentation::new(events.clone()),
        SystemIdentity::new(cfg.name.clone()),
    );
    let agent = SupportAgent::new(manager, events);

    let (intent_tx, intent_rx) = mpsc::channel::<UserIntent>(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.parse::<UserIntent>() {
                Ok(intent) => {
                    if intent_tx.send(intent).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(input = %line.trim(), error = %error, "unrecognised command");
                }
            }
        }
    });

    tracing::info!(server = %cfg.server_url, "remote support agent starting");

    let run = agent.run(channel_rx, intent_rx);
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(connected = channel.is_connected(), "received ctrl-c, disconnecting");
            channel.disconnect();
            run.await;
        }
    }

    Ok(())
}
