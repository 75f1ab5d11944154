use std::sync::Arc;

use log::{error, info};

use crate::engine::{ContainerEngine, EngineError};
use crate::unit::{CommandOutcome, UnitRef, UnitState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
    Restart,
}

impl Action {
    fn success_message(&self) -> &'static str {
        match self {
            Self::Start => "Services started successfully",
            Self::Stop => "Services stopped successfully",
            Self::Restart => "Services restarted successfully",
        }
    }
}

/// Applies start/stop/restart across both units in a fixed order, primary
/// first. A unit that fails lookup short-circuits the whole operation; a
/// partial start/stop across two interdependent units is worse than an
/// explicit, nameable failure. State is sampled per request, never cached.
pub struct LifecycleOrchestrator {
    engine: Arc<dyn ContainerEngine>,
    units: Vec<UnitRef>,
}

impl LifecycleOrchestrator {
    pub fn new(engine: Arc<dyn ContainerEngine>, units: Vec<UnitRef>) -> Self {
        Self { engine, units }
    }

    pub async fn start(&self) -> Result<CommandOutcome, EngineError> {
        self.apply(Action::Start).await
    }

    pub async fn stop(&self) -> Result<CommandOutcome, EngineError> {
        self.apply(Action::Stop).await
    }

    pub async fn restart(&self) -> Result<CommandOutcome, EngineError> {
        self.apply(Action::Restart).await
    }

    fn unit_missing(unit: &UnitRef) -> CommandOutcome {
        error!("{} container {} not found", unit.kind, unit.container_name);
        CommandOutcome::fail(format!(
            "{} container {} not found",
            unit.kind, unit.container_name
        ))
    }

    async fn apply(&self, action: Action) -> Result<CommandOutcome, EngineError> {
        for unit in &self.units {
            let name = unit.container_name.as_str();

            let state = match self.engine.state(name).await {
                Ok(s) => s,
                Err(EngineError::NotFound(_)) => return Ok(Self::unit_missing(unit)),
                Err(e) => return Err(e),
            };

            // Start is guarded by a state check; stop and restart are
            // issued unconditionally and the engine treats redundant
            // transitions as no-ops.
            if action == Action::Start && state == UnitState::Running {
                info!("{} container already running", unit.kind);
                continue;
            }

            let result = match action {
                Action::Start => self.engine.start(name).await,
                Action::Stop => self.engine.stop(name).await,
                Action::Restart => self.engine.restart(name).await,
            };

            match result {
                Ok(()) => info!("{} {} container", verb(action), unit.kind),
                Err(EngineError::NotFound(_)) => return Ok(Self::unit_missing(unit)),
                Err(e) => return Err(e),
            }
        }
        Ok(CommandOutcome::ok(action.success_message()))
    }
}

fn verb(action: Action) -> &'static str {
    match action {
        Action::Start => "Started",
        Action::Stop => "Stopped",
        Action::Restart => "Restarted",
    }
}
