use std::sync::Arc;

use log::{error, info};

use crate::engine::{ContainerEngine, EngineError};
use crate::unit::CommandOutcome;

/// Read-modify-write patcher for the Tor configuration file. The blob is
/// treated as opaque newline-delimited text: membership is a substring
/// test and the insertion point is always the end of the file. Only this
/// service writes the file.
pub struct BridgePatcher {
    engine: Arc<dyn ContainerEngine>,
    unit_name: String,
    torrc_path: String,
    torrc_dir: String,
}

impl BridgePatcher {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        unit_name: impl Into<String>,
        torrc_path: impl Into<String>,
        torrc_dir: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            unit_name: unit_name.into(),
            torrc_path: torrc_path.into(),
            torrc_dir: torrc_dir.into(),
        }
    }

    fn unit_missing(&self) -> CommandOutcome {
        CommandOutcome::fail(format!("Tor container {} not found", self.unit_name))
    }

    /// Appends a bridge line to torrc and restarts Tor so the daemon
    /// re-reads its configuration (there is no live-reload path). The line
    /// is inserted verbatim; its grammar is not validated.
    pub async fn add_bridge(&self, line: &str) -> Result<CommandOutcome, EngineError> {
        if let Err(e) = self.engine.state(&self.unit_name).await {
            return match e {
                EngineError::NotFound(_) => Ok(self.unit_missing()),
                other => Err(other),
            };
        }

        let current = match self.engine.read_file(&self.unit_name, &self.torrc_path).await {
            Ok(c) => c,
            Err(EngineError::NotFound(_)) => return Ok(self.unit_missing()),
            Err(e) => return Err(e),
        };

        if current.contains(line) {
            return Ok(CommandOutcome::fail(
                "Bridge already exists in configuration",
            ));
        }

        let updated = format!("{}\n{}", current.trim_end(), line);

        match self
            .engine
            .replace_file(
                &self.unit_name,
                &self.torrc_dir,
                "torrc",
                updated.as_bytes(),
            )
            .await
        {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => return Ok(self.unit_missing()),
            Err(e) => return Err(e),
        }

        info!("Added bridge: {}", line);

        // The write and the restart are one logical transaction for the
        // caller, but the engine offers no cross-call atomicity. A restart
        // failure leaves new config with the old process; restart is
        // re-issuable, so report it distinctly instead of rolling back.
        if let Err(e) = self.engine.restart(&self.unit_name).await {
            error!("Bridge written but Tor restart failed: {}", e);
            return Ok(CommandOutcome::fail(format!(
                "Bridge written to configuration but Tor restart failed: {}; retry restart to apply",
                e
            )));
        }

        Ok(CommandOutcome::ok("Bridge added successfully and Tor restarted"))
    }
}
