// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Service Controller: owns one service's state machine
//! (`Stopped → Starting → Running → Stopping → Stopped`, with `Error` a
//! terminal-but-recoverable sibling), its child process handle, and its
//! runtime record.

use crate::config;
use crate::event_sink::EventSink;
use command_group::AsyncCommandGroup;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use sv_core::service::{RuntimeContext, Service};
use sv_core::state::{ERROR_TAIL_LINES, InstallStatusCache};
use sv_core::{Error, EventRecord, Result, RuntimeRecord, ServiceState};
use sv_platform::{HealthProber, PlatformAdapter, PortRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;

type GroupChild = command_group::AsyncGroupChild;

struct ChildSlot {
    child: Option<GroupChild>,
    group: Option<sv_platform::GroupId>,
}

/// One service's controller. Cheap to clone (everything behind `Arc`) so
/// the Supervisor can hand out references for fan-out without contending
/// on one giant lock.
#[derive(Clone)]
pub struct ServiceController {
    inner: Arc<Inner>,
}

struct Inner {
    service: Service,
    platform: Arc<dyn PlatformAdapter>,
    prober: Arc<dyn HealthProber>,
    port_registry: Arc<PortRegistry>,
    sink: Arc<dyn EventSink>,
    self_pid: u32,
    /// Serializes start/stop/install against each other for this service;
    /// `try_lock` turns contention into `Error::Busy` rather than queuing.
    busy: AsyncMutex<()>,
    record: SyncMutex<RuntimeRecord>,
    child_slot: AsyncMutex<ChildSlot>,
}

impl ServiceController {
    pub fn new(
        service: Service,
        platform: Arc<dyn PlatformAdapter>,
        prober: Arc<dyn HealthProber>,
        port_registry: Arc<PortRegistry>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                platform,
                prober,
                port_registry,
                sink,
                self_pid: std::process::id(),
                busy: AsyncMutex::new(()),
                record: SyncMutex::new(RuntimeRecord::default()),
                child_slot: AsyncMutex::new(ChildSlot { child: None, group: None }),
            }),
        }
    }

    pub fn service(&self) -> &Service {
        &self.inner.service
    }

    pub fn snapshot(&self) -> RuntimeRecord {
        self.inner.record.lock().clone()
    }

    fn enter_stopping(&self) {
        let from = {
            let mut rec = self.inner.record.lock();
            let from = rec.state;
            rec.mark_stopping();
            from
        };
        self.inner.sink.emit(EventRecord::state_changed(
            self.inner.service.id.clone(),
            from,
            ServiceState::Stopping,
        ));
    }

    fn enter_stopped(&self) {
        let from = {
            let mut rec = self.inner.record.lock();
            let from = rec.state;
            rec.mark_stopped();
            from
        };
        self.inner.sink.emit(EventRecord::state_changed(
            self.inner.service.id.clone(),
            from,
            ServiceState::Stopped,
        ));
    }

    fn mark_error(&self, message: impl Into<String>) {
        let message = message.into();
        let from = {
            let mut rec = self.inner.record.lock();
            let from = rec.state;
            rec.mark_error(message.clone());
            from
        };
        self.inner.sink.emit(EventRecord::state_changed_with_reason(
            self.inner.service.id.clone(),
            from,
            ServiceState::Error,
            message,
        ));
    }

    /// Cached install-status lookup honoring the 5 s TTL; refreshes via
    /// `checker` on expiry or first use.
    pub async fn refresh_install_status(
        &self,
        checker: &crate::installer::InstallerRunner,
    ) -> sv_core::state::InstallStatus {
        let cached = { self.inner.record.lock().install_cache.clone() };
        if let Some(cache) = &cached {
            if !cache.is_expired() {
                return cache.value;
            }
        }
        let value = checker.check_installed(&self.inner.service).await;
        let mut rec = self.inner.record.lock();
        rec.install_cache = Some(InstallStatusCache::new(
            value,
            String::new(),
            config::install_status_ttl().as_millis() as u64,
        ));
        value
    }

    /// `Stopped → Starting → Running`. Rejects with `Error::Busy` if
    /// another start/stop is already in flight for this service, and with
    /// `Error::NotInstalled` if the install-status check (cached, 5 s TTL)
    /// does not currently report `Installed` — install precedes start.
    pub async fn start(&self, ctx: RuntimeContext, installer: &crate::installer::InstallerRunner) -> Result<()> {
        let service = &self.inner.service;

        if let Some(mbp) = &service.managed_by_peer {
            return Err(Error::ManagedByPeer { service: service.id.clone(), peer: mbp.peer.clone() });
        }

        let _guard = self
            .inner
            .busy
            .try_lock()
            .map_err(|_| Error::Busy { service: service.id.clone() })?;

        if self.inner.record.lock().state == ServiceState::Running {
            return Ok(());
        }

        let install_status = self.refresh_install_status(installer).await;
        if install_status != sv_core::state::InstallStatus::Installed {
            return Err(Error::NotInstalled {
                service: service.id.clone(),
                reason: format!("install-status check reports {install_status:?}"),
            });
        }

        let occupants = self.inner.platform.pids_on_ports(&[service.port]).await.map_err(platform_err)?;
        if occupants.get(&service.port).map(|pids| !pids.is_empty()).unwrap_or(false) {
            let outcome = self
                .inner
                .port_registry
                .reclaim(service.port, self.inner.self_pid)
                .await
                .map_err(platform_err)?;
            if outcome == sv_platform::ReclaimOutcome::StillOccupied {
                return Err(Error::PortOccupied { service: service.id.clone(), port: service.port });
            }
        }

        let recipe = service
            .start_recipe
            .as_ref()
            .ok_or_else(|| Error::ManagedByPeer {
                service: service.id.clone(),
                peer: service.id.clone(),
            })?(&ctx);
        let program = recipe.argv.first().cloned().ok_or_else(|| Error::SpawnFailed {
            service: service.id.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty start recipe"),
        })?;

        let mut command = Command::new(&program);
        command
            .args(&recipe.argv[1..])
            .current_dir(&service.working_dir)
            .envs(recipe.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .group_spawn()
            .map_err(|e| Error::SpawnFailed { service: service.id.clone(), source: e })?;

        let pid = child.id().ok_or_else(|| Error::SpawnFailed {
            service: service.id.clone(),
            source: std::io::Error::other("child exited immediately after spawn"),
        })?;

        let group = self.inner.platform.new_group().ok();
        if let Some(group) = group {
            if let Err(e) = self.inner.platform.attach(group, pid) {
                tracing::warn!(service = %service.id, error = %e, "failed to attach child to process group");
            }
        }

        {
            let mut rec = self.inner.record.lock();
            let from = rec.state;
            rec.mark_starting(pid);
            self.inner.sink.emit(EventRecord::state_changed(service.id.clone(), from, ServiceState::Starting));
        }

        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();
        self.spawn_output_readers(stdout, stderr);

        {
            let mut slot = self.inner.child_slot.lock().await;
            slot.child = Some(child);
            slot.group = group;
        }

        self.run_readiness_loop().await;
        Ok(())
    }

    fn spawn_output_readers(
        &self,
        stdout: Option<tokio::process::ChildStdout>,
        stderr: Option<tokio::process::ChildStderr>,
    ) {
        if let Some(stdout) = stdout {
            let inner = self.inner.clone();
            let mut lines = BufReader::new(stdout).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    record_output_line(&inner, sv_core::Stream::Stdout, line);
                }
            });
        }
        if let Some(stderr) = stderr {
            let inner = self.inner.clone();
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    record_output_line(&inner, sv_core::Stream::Stderr, line);
                }
            });
        }
    }

    async fn run_readiness_loop(&self) {
        let service = self.inner.service.clone_for_probe();
        let deadline = tokio::time::Instant::now() + config::health_probe_budget();
        let interval = config::health_probe_interval();
        let fallback_addr: std::net::SocketAddr =
            format!("127.0.0.1:{}", service.port).parse().unwrap_or_else(|_| {
                std::net::SocketAddr::from(([127, 0, 0, 1], service.port))
            });

        loop {
            // The child may have exited already; stop probing if so.
            if let Some(status) = self.exit_status().await {
                let tail = self.error_tail().join("\n");
                self.mark_error(format!(
                    "{} exited during startup with status {status}: {tail}",
                    self.inner.service.id
                ));
                return;
            }

            let ready = self.inner.prober.probe(service.health_url().as_deref(), fallback_addr).await;
            if ready {
                self.set_running(true);
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                self.set_running(false);
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn set_running(&self, ready: bool) {
        let from = {
            let mut rec = self.inner.record.lock();
            let from = rec.state;
            rec.mark_running(ready);
            from
        };
        self.inner.sink.emit(EventRecord::state_changed(self.inner.service.id.clone(), from, ServiceState::Running));
    }

    async fn exit_status(&self) -> Option<std::process::ExitStatus> {
        let mut slot = self.inner.child_slot.lock().await;
        match slot.child.as_mut() {
            Some(child) => child.inner().try_wait().ok().flatten(),
            None => None,
        }
    }

    /// `Running → Stopping → Stopped`: graceful terminate, then tree-kill,
    /// then port reclaim as a safety net (spec §4.3).
    pub async fn stop(&self) -> Result<()> {
        let service = &self.inner.service;
        let _guard = self
            .inner
            .busy
            .try_lock()
            .map_err(|_| Error::Busy { service: service.id.clone() })?;

        if self.inner.record.lock().state == ServiceState::Stopped {
            return Ok(());
        }

        self.enter_stopping();

        let pid = {
            let mut slot = self.inner.child_slot.lock().await;
            slot.child.as_mut().and_then(|c| c.inner().id())
        };
        let Some(pid) = pid else {
            let mut slot = self.inner.child_slot.lock().await;
            self.finish_stop(&mut slot);
            return Ok(());
        };

        graceful_terminate(pid);

        let graceful_exit = {
            let mut slot = self.inner.child_slot.lock().await;
            match slot.child.as_mut() {
                Some(child) => tokio::time::timeout(config::graceful_stop_timeout(), child.wait()).await.is_ok(),
                None => true,
            }
        };

        if !graceful_exit {
            self.inner.platform.kill_tree(pid).await.map_err(platform_err)?;
            let forced_exit = {
                let mut slot = self.inner.child_slot.lock().await;
                match slot.child.as_mut() {
                    Some(child) => tokio::time::timeout(config::force_kill_timeout(), child.wait()).await.is_ok(),
                    None => true,
                }
            };
            if !forced_exit {
                let _ = self.inner.port_registry.reclaim(service.port, self.inner.self_pid).await;
                let mut slot = self.inner.child_slot.lock().await;
                self.finish_stop(&mut slot);
                return Err(Error::StopTimeout { service: service.id.clone() });
            }
        }

        let mut slot = self.inner.child_slot.lock().await;
        self.finish_stop(&mut slot);
        Ok(())
    }

    fn finish_stop(&self, slot: &mut ChildSlot) {
        if let Some(group) = slot.group.take() {
            let _ = self.inner.platform.close_group(group);
        }
        slot.child = None;
        self.enter_stopped();
    }

    /// Last `ERROR_TAIL_LINES` output lines, for error reporting.
    pub fn error_tail(&self) -> Vec<String> {
        self.inner.record.lock().output.tail(ERROR_TAIL_LINES)
    }

    /// Runs the install recipe, serialized against any concurrent
    /// start/stop/install attempt via the same busy lock. A no-op if the
    /// install marker already exists.
    pub async fn install(
        &self,
        installer: &crate::installer::InstallerRunner,
        ctx: &RuntimeContext,
    ) -> Result<()> {
        let service = &self.inner.service;
        let _guard = self
            .inner
            .busy
            .try_lock()
            .map_err(|_| Error::Busy { service: service.id.clone() })?;

        if installer.check_installed(service).await == sv_core::state::InstallStatus::Installed {
            return Ok(());
        }

        let cancel = tokio_util::sync::CancellationToken::new();
        let result = installer.run_install(service, ctx, cancel).await;
        // Force the next status read to recheck rather than serve a stale
        // cached "not installed".
        self.inner.record.lock().install_cache = None;
        result
    }

    /// Re-checks a `Running` service outside the startup readiness window
    /// (spec §4.5's periodic refresh). Demotes to `Error` if the child has
    /// exited; otherwise leaves `ready_confirmed` untouched once it is true,
    /// to avoid re-probing services that already answered once.
    pub async fn reprobe(&self) {
        if let Some(status) = self.exit_status().await {
            let tail = self.error_tail().join("\n");
            self.mark_error(format!(
                "{} exited unexpectedly with status {status}: {tail}",
                self.inner.service.id
            ));
            return;
        }

        let already_confirmed = {
            let rec = self.inner.record.lock();
            rec.state != ServiceState::Running || rec.ready_confirmed
        };
        if already_confirmed {
            return;
        }

        let service = self.inner.service.clone_for_probe();
        let fallback_addr: std::net::SocketAddr = format!("127.0.0.1:{}", service.port)
            .parse()
            .unwrap_or_else(|_| std::net::SocketAddr::from(([127, 0, 0, 1], service.port)));
        let ready = self.inner.prober.probe(service.health_url().as_deref(), fallback_addr).await;
        let mut rec = self.inner.record.lock();
        if rec.state == ServiceState::Running {
            rec.ready_confirmed = ready;
        }
    }
}

/// `sv-platform` sits below `sv-supervisor`, not below `sv-core`, so there is
/// no `From` impl to lean on here; fold it into the catch-all string variant.
fn platform_err(e: sv_platform::PlatformError) -> Error {
    Error::Config(format!("platform error: {e}"))
}

fn record_output_line(inner: &Arc<Inner>, stream: sv_core::Stream, line: String) {
    inner.record.lock().output.push(line.clone());
    inner.sink.emit(EventRecord::LogLine { service: inner.service.id.clone(), stream, line });
}

impl Service {
    /// A cheap clone restricted to what the readiness loop needs, so the
    /// lock guarding the controller's state doesn't have to be held across
    /// an `.await`.
    fn clone_for_probe(&self) -> Service {
        self.clone()
    }
}

#[cfg(unix)]
fn graceful_terminate(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn graceful_terminate(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sink::RecordingSink;
    use crate::installer::InstallerRunner;
    use std::path::PathBuf;
    use sv_core::service::{InstallCheck, Recipe};
    use sv_core::ServiceId;
    use sv_platform::fake::FakePlatform;
    use sv_platform::probe::FakeProber;

    fn service(id: &str, install_check: InstallCheck) -> Service {
        Service {
            id: ServiceId::new(id),
            display_name: id.to_string(),
            port: 9100,
            base_url: "http://localhost:9100".to_string(),
            health_path: None,
            working_dir: PathBuf::from("/tmp"),
            is_core: false,
            install_recipe: Arc::new(|_| Recipe::new(["true"])),
            start_recipe: Some(Arc::new(|_| Recipe::new(["true"]))),
            managed_by_peer: None,
            install_check,
        }
    }

    fn controller(svc: Service, platform: Arc<FakePlatform>) -> ServiceController {
        let prober = Arc::new(FakeProber::new());
        let port_registry = Arc::new(PortRegistry::new(platform.clone()));
        let sink = Arc::new(RecordingSink::new());
        ServiceController::new(svc, platform, prober, port_registry, sink)
    }

    #[tokio::test]
    async fn start_on_an_uninstalled_service_returns_not_installed_and_spawns_nothing() {
        let svc = service(
            "whisper",
            InstallCheck::Interpreted {
                venv_dir: PathBuf::from("/nonexistent/venv/for/a/test/that/must/not/exist"),
                representative_packages: Vec::new(),
            },
        );
        let platform = Arc::new(FakePlatform::new());
        let ctl = controller(svc, platform.clone());
        let installer = InstallerRunner::new(Arc::new(RecordingSink::new()));

        let result = ctl.start(RuntimeContext::default(), &installer).await;

        assert!(matches!(result, Err(Error::NotInstalled { .. })));
        assert_eq!(ctl.snapshot().state, ServiceState::Stopped);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn start_on_a_compiled_asset_service_with_no_artifact_dir_is_not_installed() {
        let svc = service(
            "frontend",
            InstallCheck::CompiledAsset { artifact_dir: PathBuf::from("/nonexistent/node_modules") },
        );
        let platform = Arc::new(FakePlatform::new());
        let ctl = controller(svc, platform);
        let installer = InstallerRunner::new(Arc::new(RecordingSink::new()));

        let result = ctl.start(RuntimeContext::default(), &installer).await;

        assert!(matches!(result, Err(Error::NotInstalled { .. })));
    }
}
