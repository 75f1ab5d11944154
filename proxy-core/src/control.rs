use std::sync::Arc;

use log::{error, info};

use crate::engine::{ContainerEngine, EngineError};
use crate::unit::CommandOutcome;

/// Client for the Tor control port. The port is loopback-only inside the
/// container's network namespace, so the authenticate+signal sequence is
/// piped through `nc` via the engine's exec channel.
pub struct ControlChannel {
    engine: Arc<dyn ContainerEngine>,
    unit_name: String,
    control_port: u16,
}

impl ControlChannel {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        unit_name: impl Into<String>,
        control_port: u16,
    ) -> Self {
        Self {
            engine,
            unit_name: unit_name.into(),
            control_port,
        }
    }

    fn command(&self) -> String {
        format!(
            "printf 'AUTHENTICATE \"\"\r\nSIGNAL NEWNYM\r\n' | nc localhost {}",
            self.control_port
        )
    }

    /// Requests a new circuit. Success is declared iff the captured reply
    /// contains the literal `OK` token; the control protocol's only
    /// observable success signal here is that substring, not a structured
    /// reply.
    pub async fn signal_new_circuit(&self) -> Result<CommandOutcome, EngineError> {
        let output = match self.engine.exec(&self.unit_name, &self.command()).await {
            Ok(out) => out,
            Err(EngineError::NotFound(name)) => {
                error!("Cannot send newnym signal: container '{}' not found", name);
                return Ok(CommandOutcome::fail(format!(
                    "Tor container {} not found",
                    name
                )));
            }
            Err(e) => return Err(e),
        };

        if output.contains("OK") {
            info!("Newnym signal sent successfully");
            Ok(CommandOutcome::ok("Newnym signal sent successfully"))
        } else {
            error!("Failed to send newnym signal: {}", output);
            Ok(CommandOutcome::fail(format!(
                "Failed to send newnym signal: {}",
                output
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::unit::UnitState;

    const TOR: &str = "tor_proxy_tor";

    fn channel(engine: Arc<MockEngine>) -> ControlChannel {
        ControlChannel::new(engine, TOR, 9051)
    }

    #[tokio::test]
    async fn succeeds_on_ok_token() {
        let engine = Arc::new(MockEngine::new().with_unit(TOR, UnitState::Running));
        engine.set_exec_output(TOR, "250 OK\r\n");
        let outcome = channel(engine).signal_new_circuit().await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn ok_token_found_amid_noise() {
        let engine = Arc::new(MockEngine::new().with_unit(TOR, UnitState::Running));
        engine.set_exec_output(TOR, "junk line\n   250 OK   \ntrailing\n");
        let outcome = channel(engine).signal_new_circuit().await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn fails_without_ok_token() {
        let engine = Arc::new(MockEngine::new().with_unit(TOR, UnitState::Running));
        engine.set_exec_output(TOR, "515 Authentication failed\r\n");
        let outcome = channel(engine).signal_new_circuit().await.unwrap();
        assert!(!outcome.success);
        // raw reply carried for diagnostics
        assert!(outcome.message.contains("515 Authentication failed"));
    }

    #[tokio::test]
    async fn missing_container_is_a_failure_outcome_not_an_error() {
        let engine = Arc::new(MockEngine::new());
        let outcome = channel(engine).signal_new_circuit().await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("not found"));
    }

    #[test]
    fn command_targets_control_port() {
        let engine = Arc::new(MockEngine::new());
        let chan = ControlChannel::new(engine, TOR, 9051);
        let cmd = chan.command();
        assert!(cmd.starts_with("printf 'AUTHENTICATE"));
        assert!(cmd.contains("SIGNAL NEWNYM"));
        assert!(cmd.ends_with("nc localhost 9051"));
    }
}
