use clap::Parser;

pub const TOKEN_ENV: &str = "SUPPORT_AGENT_TOKEN";

#[derive(Debug, Parser, Clone)]
#[command(name = "remote-support-agent")]
#[command(about = "Answers remote-support requests and relays session signaling")]
pub struct Config {
    /// Base URL of the signaling server; `http(s)://` is mapped to `ws(s)://`
    /// and a bare path gets `/agent/ws`.
    #[arg(long)]
    pub server_url: String,

    /// Auth token for the channel; falls back to $SUPPORT_AGENT_TOKEN.
    #[arg(long)]
    pub token: Option<String>,

    /// Name shown to controllers instead of the hostname.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, default_value_t = false)]
    pub json_output: bool,
}

impl Config {
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}
