//! Dispatch-side enrichment: process-wide fields stamped on every entry
//! right before it is sent.

use crate::config::ShipperConfig;
use crate::record::LogEntry;
use std::net::{IpAddr, ToSocketAddrs};

const LOOPBACK_FALLBACK: &str = "127.0.0.1";
const UNRESOLVED_FALLBACK: &str = "0.0.0.0";

/// Identity of the host process, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub machine_name: String,
    pub ip_address: String,
}

impl HostIdentity {
    /// Resolve the machine name and a best-effort IPv4 address for it.
    ///
    /// DNS resolution may block briefly; this runs once, before the
    /// dispatcher is spawned.
    pub fn resolve() -> Self {
        let machine_name = machine_name();
        let ip_address = resolve_ip(&machine_name);
        Self {
            machine_name,
            ip_address,
        }
    }
}

/// Machine name: `HOSTNAME`/`COMPUTERNAME` override, then the OS host name.
pub fn machine_name() -> String {
    for key in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(name) = std::env::var(key) {
            if !name.trim().is_empty() {
                return name;
            }
        }
    }

    #[cfg(unix)]
    {
        if let Ok(name) = nix::unistd::gethostname() {
            if let Some(name) = name.to_str() {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }

    "unknown".to_string()
}

/// First IPv4 address the host name resolves to. `127.0.0.1` when the name
/// resolves to no IPv4 address, `0.0.0.0` when resolution fails outright.
pub fn resolve_ip(host: &str) -> String {
    match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs
            .map(|addr| addr.ip())
            .find(IpAddr::is_ipv4)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| LOOPBACK_FALLBACK.to_string()),
        Err(_) => UNRESOLVED_FALLBACK.to_string(),
    }
}

/// The static fields the dispatcher stamps on each entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFields {
    pub project_name: String,
    pub environment: String,
    pub machine_name: String,
    pub ip_address: String,
}

impl StaticFields {
    pub fn new(config: &ShipperConfig, host: HostIdentity) -> Self {
        Self {
            project_name: config.project_name.clone(),
            environment: config.environment.to_string(),
            machine_name: host.machine_name,
            ip_address: host.ip_address,
        }
    }

    pub fn stamp(&self, entry: &mut LogEntry) {
        entry.project_name = Some(self.project_name.clone());
        entry.environment = Some(self.environment.clone());
        entry.machine_name = Some(self.machine_name.clone());
        entry.ip_address = Some(self.ip_address.clone());
    }
}
