pub mod docker;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::unit::UnitState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("container '{0}' not found")]
    NotFound(String),

    #[error("container engine unavailable: {0}")]
    Unavailable(String),

    #[error("exec in '{unit}' failed: {reason}")]
    Exec { unit: String, reason: String },
}

/// The capability the core needs from the container runtime.
/// Implemented for Docker; the mock stands in for tests.
///
/// Any call may fail with `NotFound` (the unit no longer exists) or
/// `Unavailable` (the engine itself is unreachable). Callers must handle
/// both per unit so one unit's failure never aborts work on the other.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Looks up the named unit and reports its lifecycle state.
    async fn state(&self, name: &str) -> Result<UnitState, EngineError>;

    async fn start(&self, name: &str) -> Result<(), EngineError>;

    /// Stopping an already-stopped unit is a harmless no-op.
    async fn stop(&self, name: &str) -> Result<(), EngineError>;

    async fn restart(&self, name: &str) -> Result<(), EngineError>;

    /// Runs a shell command inside the unit, returning captured
    /// stdout+stderr as text.
    async fn exec(&self, name: &str, command: &str) -> Result<String, EngineError>;

    /// Tail of the unit's log stream.
    async fn logs(&self, name: &str, tail: usize) -> Result<String, EngineError>;

    /// Reads a file from inside the unit. The engine has no dedicated read
    /// API; implementations go through the exec channel.
    async fn read_file(&self, name: &str, path: &str) -> Result<String, EngineError>;

    /// Whole-file replace inside the unit's writable filesystem. Atomic
    /// from the caller's perspective.
    async fn replace_file(
        &self,
        name: &str,
        dir: &str,
        filename: &str,
        contents: &[u8],
    ) -> Result<(), EngineError>;
}
