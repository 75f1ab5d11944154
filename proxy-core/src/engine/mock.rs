use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ContainerEngine, EngineError};
use crate::unit::UnitState;

/// Canned engine for tests. Unit states, file contents and exec output are
/// programmed up front; every call is recorded so tests can assert counts
/// and short-circuiting.
#[derive(Default)]
pub struct MockEngine {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    states: HashMap<String, UnitState>,
    files: HashMap<String, String>,
    exec_output: HashMap<String, String>,
    logs: HashMap<String, String>,
    unavailable: bool,
    fail_restart: bool,
    calls: Vec<String>,
}

fn file_key(name: &str, path: &str) -> String {
    format!("{}:{}", name, path)
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(self, name: &str, state: UnitState) -> Self {
        self.set_state(name, state);
        self
    }

    pub fn set_state(&self, name: &str, state: UnitState) {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(name.to_string(), state);
    }

    pub fn set_file(&self, name: &str, path: &str, contents: &str) {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert(file_key(name, path), contents.to_string());
    }

    pub fn set_exec_output(&self, name: &str, output: &str) {
        self.inner
            .lock()
            .unwrap()
            .exec_output
            .insert(name.to_string(), output.to_string());
    }

    pub fn set_logs(&self, name: &str, text: &str) {
        self.inner
            .lock()
            .unwrap()
            .logs
            .insert(name.to_string(), text.to_string());
    }

    /// Make every subsequent call fail as if the engine were unreachable.
    pub fn set_unavailable(&self) {
        self.inner.lock().unwrap().unavailable = true;
    }

    /// Make restart calls fail while everything else keeps working.
    pub fn fail_restarts(&self) {
        self.inner.lock().unwrap().fail_restart = true;
    }

    pub fn file(&self, name: &str, path: &str) -> Option<String> {
        self.inner.lock().unwrap().files.get(&file_key(name, path)).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls whose label starts with `prefix`,
    /// e.g. `"start:"` or `"restart:tor_proxy_tor"`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }

    fn check_up(&self) -> Result<(), EngineError> {
        if self.inner.lock().unwrap().unavailable {
            Err(EngineError::Unavailable("mock engine down".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_known(&self, name: &str) -> Result<(), EngineError> {
        if self.inner.lock().unwrap().states.contains_key(name) {
            Ok(())
        } else {
            Err(EngineError::NotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn state(&self, name: &str) -> Result<UnitState, EngineError> {
        self.record(format!("state:{}", name));
        self.check_up()?;
        self.inner
            .lock()
            .unwrap()
            .states
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn start(&self, name: &str) -> Result<(), EngineError> {
        self.record(format!("start:{}", name));
        self.check_up()?;
        self.check_known(name)?;
        self.set_state(name, UnitState::Running);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), EngineError> {
        self.record(format!("stop:{}", name));
        self.check_up()?;
        self.check_known(name)?;
        self.set_state(name, UnitState::Exited);
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), EngineError> {
        self.record(format!("restart:{}", name));
        self.check_up()?;
        if self.inner.lock().unwrap().fail_restart {
            return Err(EngineError::Unavailable("restart refused".to_string()));
        }
        self.check_known(name)?;
        self.set_state(name, UnitState::Running);
        Ok(())
    }

    async fn exec(&self, name: &str, command: &str) -> Result<String, EngineError> {
        self.record(format!("exec:{}:{}", name, command));
        self.check_up()?;
        self.check_known(name)?;
        self.inner
            .lock()
            .unwrap()
            .exec_output
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Exec {
                unit: name.to_string(),
                reason: "no canned exec output".to_string(),
            })
    }

    async fn logs(&self, name: &str, _tail: usize) -> Result<String, EngineError> {
        self.record(format!("logs:{}", name));
        self.check_up()?;
        self.check_known(name)?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .logs
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_file(&self, name: &str, path: &str) -> Result<String, EngineError> {
        self.record(format!("read_file:{}:{}", name, path));
        self.check_up()?;
        self.check_known(name)?;
        self.inner
            .lock()
            .unwrap()
            .files
            .get(&file_key(name, path))
            .cloned()
            .ok_or_else(|| EngineError::Exec {
                unit: name.to_string(),
                reason: format!("cat: {}: No such file or directory", path),
            })
    }

    async fn replace_file(
        &self,
        name: &str,
        dir: &str,
        filename: &str,
        contents: &[u8],
    ) -> Result<(), EngineError> {
        self.record(format!("replace_file:{}:{}{}", name, dir, filename));
        self.check_up()?;
        self.check_known(name)?;
        let path = format!("{}{}", dir, filename);
        self.inner.lock().unwrap().files.insert(
            file_key(name, &path),
            String::from_utf8_lossy(contents).into_owned(),
        );
        Ok(())
    }
}
