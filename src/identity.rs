use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Placeholder used whenever a piece of identity cannot be resolved.
pub const UNKNOWN: &str = "Unknown";

/// The local machine as announced to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    #[serde(rename = "computerId")]
    pub id: String,
    #[serde(rename = "computerName")]
    pub display_name: String,
    #[serde(rename = "osInfo")]
    pub platform_info: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
}

pub trait IdentityProvider {
    /// Resolve the identity fresh. Never fails; unknown parts use [`UNKNOWN`].
    fn resolve(&self) -> AgentIdentity;
}

impl IdentityProvider for AgentIdentity {
    fn resolve(&self) -> AgentIdentity {
        self.clone()
    }
}

/// Resolves identity from the running host.
#[derive(Debug, Clone, Default)]
pub struct SystemIdentity {
    display_name: Option<String>,
}

impl SystemIdentity {
    pub fn new(display_name: Option<String>) -> Self {
        Self {
            display_name: display_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
        }
    }
}

impl IdentityProvider for SystemIdentity {
    fn resolve(&self) -> AgentIdentity {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());
        if host.is_none() {
            tracing::warn!(
                target = "support_agent::identity",
                "hostname lookup failed; registering with sentinel id"
            );
        }

        let ip_address = match primary_ipv4() {
            Some(ip) => ip.to_string(),
            None => {
                tracing::warn!(
                    target = "support_agent::identity",
                    "no routable ipv4 address found"
                );
                UNKNOWN.to_string()
            }
        };

        let id = host.clone().unwrap_or_else(|| UNKNOWN.to_string());
        let display_name = self
            .display_name
            .clone()
            .or(host)
            .unwrap_or_else(|| UNKNOWN.to_string());

        AgentIdentity {
            id,
            display_name,
            platform_info: platform_info(),
            ip_address,
        }
    }
}

pub fn platform_info() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// First non-loopback, non-link-local IPv4 address of the host.
pub fn primary_ipv4() -> Option<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(error) => {
            tracing::warn!(
                target = "support_agent::identity",
                error = %error,
                "failed to enumerate network interfaces"
            );
            return None;
        }
    };
    pick_primary_ipv4(interfaces.iter().map(|iface| iface.ip()))
}

pub fn pick_primary_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified() => {
            Some(v4)
        }
        _ => None,
    })
}
