use serde::{Deserialize, Serialize};

use crate::unit::{UnitKind, UnitRef};

/// Process-wide configuration, fixed at startup and passed into each
/// component. Defaults mirror the docker-compose deployment; a handful of
/// values can be overridden from the environment.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControlConfig {
    pub server_port: u16,

    // Credentials for the HTTP API (basic auth)
    pub admin_user: String,
    pub admin_pass: String,

    // Container identities
    pub tor_container_name: String,
    pub lyrebird_container_name: String,

    // Tor configuration file
    pub torrc_path: String,
    pub torrc_dir: String,

    // Control channel and SOCKS interface
    pub control_port: u16,
    pub socks_proxy_url: String,

    // Exit IP diagnostic probe
    pub ip_check_url: String,
    pub ip_check_timeout_secs: u64,

    // Log tail sizes
    pub service_log_tail: usize,
    pub combined_log_tail: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            server_port: 8000,

            admin_user: "admin".to_string(),
            admin_pass: "your_secure_password".to_string(),

            tor_container_name: "tor_proxy_tor".to_string(),
            lyrebird_container_name: "tor_proxy_lyrebird".to_string(),

            torrc_path: "/etc/tor/torrc".to_string(),
            torrc_dir: "/etc/tor/".to_string(),

            control_port: 9051,
            socks_proxy_url: "socks5://tor_proxy_tor:9050".to_string(),

            ip_check_url: "https://httpbin.org/ip".to_string(),
            ip_check_timeout_secs: 10,

            service_log_tail: 100,
            combined_log_tail: 50,
        }
    }
}

impl ControlConfig {
    /// Defaults overlaid with the environment variables the deployment sets.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("ADMIN_USER") {
            cfg.admin_user = v;
        }
        if let Ok(v) = std::env::var("ADMIN_PASS") {
            cfg.admin_pass = v;
        }
        if let Ok(v) = std::env::var("TOR_CONTAINER_NAME") {
            cfg.tor_container_name = v;
        }
        if let Ok(v) = std::env::var("LYREBIRD_CONTAINER_NAME") {
            cfg.lyrebird_container_name = v;
        }
        if let Ok(v) = std::env::var("SERVER_PORT") {
            if let Ok(port) = v.parse() {
                cfg.server_port = port;
            }
        }
        cfg
    }

    pub fn primary(&self) -> UnitRef {
        UnitRef {
            kind: UnitKind::Primary,
            container_name: self.tor_container_name.clone(),
        }
    }

    pub fn transport_helper(&self) -> UnitRef {
        UnitRef {
            kind: UnitKind::TransportHelper,
            container_name: self.lyrebird_container_name.clone(),
        }
    }

    /// Both managed units in lifecycle order: primary first.
    pub fn units(&self) -> Vec<UnitRef> {
        vec![self.primary(), self.transport_helper()]
    }
}
