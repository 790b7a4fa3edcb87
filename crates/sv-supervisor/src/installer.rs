// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Installer Runner: executes a service's install recipe as a child
//! process, streaming stdout+stderr line-by-line to the Event Sink, with
//! cancellation and a cheap cached "is it already installed" check.

use crate::event_sink::EventSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sv_core::service::{InstallCheck, RuntimeContext, Service};
use sv_core::state::InstallStatus;
use sv_core::{Error, EventRecord, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How long a probe (interpreter launch, or `import` check) is given before
/// it is treated as a failure rather than left to hang.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct InstallerRunner {
    sink: Arc<dyn EventSink>,
}

fn venv_interpreter(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

impl InstallerRunner {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Probes the service's actual environment — not whether this process
    /// ever ran an install for it — the way `launcher/manager.py`'s
    /// `check_venv`/`check_dependencies` do: a venv installed out-of-band,
    /// or by a previous launcher run, reports `Installed` just the same.
    pub async fn check_installed(&self, service: &Service) -> InstallStatus {
        match &service.install_check {
            InstallCheck::CompiledAsset { artifact_dir } => match tokio::fs::metadata(artifact_dir).await {
                Ok(meta) if meta.is_dir() => InstallStatus::Installed,
                Ok(_) => InstallStatus::NotInstalled,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => InstallStatus::NotInstalled,
                Err(_) => InstallStatus::Error,
            },
            InstallCheck::Interpreted { venv_dir, representative_packages } => {
                let interpreter = venv_interpreter(venv_dir);
                if tokio::fs::metadata(&interpreter).await.is_err() {
                    return InstallStatus::NotInstalled;
                }

                let mut command = Command::new(&interpreter);
                if representative_packages.is_empty() {
                    command.arg("--version");
                } else {
                    let imports = representative_packages.join(", ");
                    command.arg("-c").arg(format!("import {imports}"));
                }
                command.stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null());

                match tokio::time::timeout(PROBE_TIMEOUT, command.status()).await {
                    Ok(Ok(status)) if status.success() => InstallStatus::Installed,
                    Ok(Ok(_)) => InstallStatus::NotInstalled,
                    Ok(Err(_)) => InstallStatus::Error,
                    Err(_) => InstallStatus::Error,
                }
            }
        }
    }

    /// Run the install recipe to completion, streaming every output line as
    /// `EventRecord::InstallProgress`. Cancels cleanly if `cancel` fires.
    pub async fn run_install(
        &self,
        service: &Service,
        ctx: &RuntimeContext,
        cancel: CancellationToken,
    ) -> Result<()> {
        let recipe = (service.install_recipe)(ctx);
        let Some(program) = recipe.argv.first() else {
            return Err(Error::InstallFailed {
                service: service.id.clone(),
                reason: "install recipe produced an empty command".to_string(),
            });
        };

        tokio::fs::create_dir_all(&service.working_dir).await.ok();

        let mut command = Command::new(program);
        command
            .args(&recipe.argv[1..])
            .current_dir(&service.working_dir)
            .envs(recipe.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::InstallFailed {
            service: service.id.clone(),
            reason: format!("failed to spawn installer: {e}"),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink_out = self.sink.clone();
        let id_out = service.id.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink_out.emit(EventRecord::InstallProgress { service: id_out.clone(), line });
                }
            }
        });
        let sink_err = self.sink.clone();
        let id_err = service.id.clone();
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink_err.emit(EventRecord::InstallProgress { service: id_err.clone(), line });
                }
            }
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(Error::Io)?,
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return Err(Error::InstallFailed {
                    service: service.id.clone(),
                    reason: "install cancelled".to_string(),
                });
            }
        };
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        if !status.success() {
            return Err(Error::InstallFailed {
                service: service.id.clone(),
                reason: format!("installer exited with {status}"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sink::RecordingSink;
    use std::sync::Arc;
    use sv_core::service::Recipe;
    use tempfile::tempdir;

    fn service_with_recipe(id: &str, working_dir: PathBuf, install_check: InstallCheck) -> Service {
        Service {
            id: sv_core::ServiceId::new(id),
            display_name: id.to_string(),
            port: 9000,
            base_url: "http://localhost:9000".to_string(),
            health_path: None,
            working_dir,
            is_core: false,
            install_recipe: Arc::new(|_| Recipe::new(["true"])),
            start_recipe: Some(Arc::new(|_| Recipe::new(["true"]))),
            managed_by_peer: None,
            install_check,
        }
    }

    #[tokio::test]
    async fn compiled_asset_check_reflects_artifact_directory_presence() {
        let work_dir = tempdir().unwrap();
        let artifact_dir = work_dir.path().join("node_modules");
        let sink = Arc::new(RecordingSink::new());
        let runner = InstallerRunner::new(sink);
        let service = service_with_recipe(
            "frontend",
            work_dir.path().to_path_buf(),
            InstallCheck::CompiledAsset { artifact_dir: artifact_dir.clone() },
        );

        assert_eq!(runner.check_installed(&service).await, InstallStatus::NotInstalled);
        tokio::fs::create_dir_all(&artifact_dir).await.unwrap();
        assert_eq!(runner.check_installed(&service).await, InstallStatus::Installed);
    }

    #[tokio::test]
    async fn interpreted_check_requires_a_real_interpreter() {
        let work_dir = tempdir().unwrap();
        let venv_dir = work_dir.path().join(".venv");
        let sink = Arc::new(RecordingSink::new());
        let runner = InstallerRunner::new(sink);
        let service = service_with_recipe(
            "whisper",
            work_dir.path().to_path_buf(),
            InstallCheck::Interpreted { venv_dir: venv_dir.clone(), representative_packages: Vec::new() },
        );

        assert_eq!(runner.check_installed(&service).await, InstallStatus::NotInstalled);

        let interpreter = venv_interpreter(&venv_dir);
        tokio::fs::create_dir_all(interpreter.parent().unwrap()).await.unwrap();
        tokio::fs::write(&interpreter, b"#!/bin/sh\nexit 0\n").await.unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&interpreter).await.unwrap().permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(&interpreter, perms).await.unwrap();
        }

        #[cfg(unix)]
        assert_eq!(runner.check_installed(&service).await, InstallStatus::Installed);
    }

    #[tokio::test]
    async fn failing_recipe_is_reported() {
        let work_dir = tempdir().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let runner = InstallerRunner::new(sink);
        let mut service = service_with_recipe(
            "gateway",
            work_dir.path().to_path_buf(),
            InstallCheck::Interpreted { venv_dir: work_dir.path().join(".venv"), representative_packages: Vec::new() },
        );
        service.install_recipe = Arc::new(|_| Recipe::new(["false"]));

        let result = runner.run_install(&service, &RuntimeContext::default(), CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
