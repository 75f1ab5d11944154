use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{error, warn};

use crate::engine::{ContainerEngine, EngineError};
use crate::unit::{ServiceStatus, UnitState};

/// Best-effort lookup of the exit-side IP, routed through the Tor SOCKS
/// proxy. Diagnostic display data only, never a correctness signal.
#[async_trait]
pub trait ExitIpProbe: Send + Sync {
    async fn current_ip(&self) -> anyhow::Result<String>;
}

/// Probe backed by an HTTP client with a SOCKS5 proxy and a bounded
/// timeout, so a hung proxy cannot stall status reporting.
pub struct SocksIpProbe {
    client: reqwest::Client,
    check_url: String,
}

impl SocksIpProbe {
    pub fn new(socks_url: &str, check_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(socks_url).context("invalid SOCKS proxy url")?)
            .timeout(timeout)
            .build()
            .context("failed to build proxied HTTP client")?;
        Ok(Self {
            client,
            check_url: check_url.to_string(),
        })
    }
}

#[async_trait]
impl ExitIpProbe for SocksIpProbe {
    async fn current_ip(&self) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(&self.check_url)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        body.get("origin")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("response body missing 'origin' field"))
    }
}

/// Assembles one status snapshot from independently-failing sub-queries.
/// Each field degrades on its own; no failure aborts the others and
/// `snapshot` itself never fails.
pub struct StatusAggregator {
    engine: Arc<dyn ContainerEngine>,
    probe: Arc<dyn ExitIpProbe>,
    tor_name: String,
    lyrebird_name: String,
    torrc_path: String,
}

impl StatusAggregator {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        probe: Arc<dyn ExitIpProbe>,
        tor_name: impl Into<String>,
        lyrebird_name: impl Into<String>,
        torrc_path: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            probe,
            tor_name: tor_name.into(),
            lyrebird_name: lyrebird_name.into(),
            torrc_path: torrc_path.into(),
        }
    }

    pub async fn snapshot(&self) -> ServiceStatus {
        let tor_status = self.unit_state(&self.tor_name).await;
        let lyrebird_status = self.unit_state(&self.lyrebird_name).await;

        let current_ip = match self.probe.current_ip().await {
            Ok(ip) => Some(ip),
            Err(e) => {
                warn!("Could not get current IP through Tor: {}", e);
                None
            }
        };

        // Version and bridge flag need a live process to ask.
        let mut tor_version = None;
        let mut bridges_enabled = false;
        if tor_status == UnitState::Running {
            match self.engine.exec(&self.tor_name, "tor --version").await {
                Ok(out) => tor_version = Some(out.trim().to_string()),
                Err(e) => error!("Could not get Tor version: {}", e),
            }
            match self.engine.read_file(&self.tor_name, &self.torrc_path).await {
                // Absence of the directive means bridges are off, not unknown.
                Ok(torrc) => bridges_enabled = torrc.contains("UseBridges 1"),
                Err(e) => error!("Could not check bridge configuration: {}", e),
            }
        }

        ServiceStatus {
            tor_status,
            lyrebird_status,
            current_ip,
            tor_version,
            bridges_enabled,
        }
    }

    async fn unit_state(&self, name: &str) -> UnitState {
        match self.engine.state(name).await {
            Ok(state) => state,
            Err(EngineError::NotFound(_)) => UnitState::NotFound,
            Err(e) => {
                warn!("Could not query state of '{}': {}", name, e);
                UnitState::NotFound
            }
        }
    }
}
