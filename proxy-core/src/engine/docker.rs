use async_trait::async_trait;
use bollard::container::{
    LogsOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::ContainerStateStatusEnum;
use bollard::Docker;
use futures::StreamExt;
use log::debug;

use super::{ContainerEngine, EngineError};
use crate::unit::UnitState;

/// Docker-backed engine adapter.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    fn map_err(name: &str, err: bollard::errors::Error) -> EngineError {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => EngineError::NotFound(name.to_string()),
            other => EngineError::Unavailable(other.to_string()),
        }
    }
}

fn map_status(status: Option<ContainerStateStatusEnum>) -> UnitState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => UnitState::Created,
        Some(ContainerStateStatusEnum::RUNNING) => UnitState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => UnitState::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => UnitState::Restarting,
        Some(ContainerStateStatusEnum::EXITED) => UnitState::Exited,
        // Docker also reports "removing"; fold it and anything unknown into dead.
        _ => UnitState::Dead,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn state(&self, name: &str) -> Result<UnitState, EngineError> {
        let inspect = self
            .docker
            .inspect_container(name, None)
            .await
            .map_err(|e| Self::map_err(name, e))?;
        Ok(map_status(inspect.state.and_then(|s| s.status)))
    }

    async fn start(&self, name: &str) -> Result<(), EngineError> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already started
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(Self::map_err(name, e)),
        }
    }

    async fn stop(&self, name: &str) -> Result<(), EngineError> {
        match self
            .docker
            .stop_container(name, None::<StopContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(Self::map_err(name, e)),
        }
    }

    async fn restart(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .restart_container(name, None::<RestartContainerOptions>)
            .await
            .map_err(|e| Self::map_err(name, e))
    }

    async fn exec(&self, name: &str, command: &str) -> Result<String, EngineError> {
        debug!("exec in '{}': {}", name, command);
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(vec![
                        "sh".to_string(),
                        "-c".to_string(),
                        command.to_string(),
                    ]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Self::map_err(name, e))?;

        let mut collected = String::new();
        let results = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Self::map_err(name, e))?;
        if let StartExecResults::Attached { mut output, .. } = results {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(msg) => collected.push_str(&msg.to_string()),
                    Err(e) => {
                        return Err(EngineError::Exec {
                            unit: name.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }
        Ok(collected)
    }

    async fn logs(&self, name: &str, tail: usize) -> Result<String, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.logs(name, Some(options));
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            let msg = chunk.map_err(|e| Self::map_err(name, e))?;
            collected.push_str(&msg.to_string());
        }
        Ok(collected)
    }

    async fn read_file(&self, name: &str, path: &str) -> Result<String, EngineError> {
        self.exec(name, &format!("cat {}", path)).await
    }

    async fn replace_file(
        &self,
        name: &str,
        dir: &str,
        filename: &str,
        contents: &[u8],
    ) -> Result<(), EngineError> {
        // The engine's put-archive call wants a tar stream: single entry,
        // size header, raw bytes.
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_data(&mut header, filename, contents)
            .map_err(|e| EngineError::Unavailable(format!("failed to package {}: {}", filename, e)))?;
        let archive = builder
            .into_inner()
            .map_err(|e| EngineError::Unavailable(format!("failed to package {}: {}", filename, e)))?;

        self.docker
            .upload_to_container(
                name,
                Some(UploadToContainerOptions::<String> {
                    path: dir.to_string(),
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .map_err(|e| Self::map_err(name, e))
    }
}
