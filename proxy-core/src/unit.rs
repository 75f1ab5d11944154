use serde::{Deserialize, Serialize};

/// Identity of one of the two managed sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// The Tor daemon itself.
    Primary,
    /// The lyrebird pluggable-transport helper.
    TransportHelper,
}

impl UnitKind {
    /// Alias used in the logs API paths (`/api/logs/{alias}`).
    pub fn api_alias(&self) -> &'static str {
        match self {
            Self::Primary => "tor",
            Self::TransportHelper => "lyrebird",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "Tor"),
            Self::TransportHelper => write!(f, "Lyrebird"),
        }
    }
}

/// One managed unit: a fixed role bound to a container name. Lifecycle
/// operations loop over an ordered list of these instead of duplicating
/// per-unit code.
#[derive(Debug, Clone)]
pub struct UnitRef {
    pub kind: UnitKind,
    pub container_name: String,
}

/// Lifecycle state as observed through the container engine. Everything but
/// `NotFound` is passed through verbatim from the engine; `NotFound` is
/// synthesized when the lookup itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    NotFound,
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::NotFound => "not_found",
        };
        write!(f, "{}", s)
    }
}

/// Best-effort status view assembled per request; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub tor_status: UnitState,
    pub lyrebird_status: UnitState,
    pub current_ip: Option<String>,
    pub tor_version: Option<String>,
    pub bridges_enabled: bool,
}

/// Result of a mutating operation. Composite operations fold both units
/// into a single outcome, first failure wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}
