// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Supervisor: the top-level coordinator. Owns one [`ServiceController`]
//! per declared service and dispatches the install/start/stop/status
//! operations the Command API exposes, plus the periodic background
//! refresh that keeps `Running` services honest between commands.

use crate::config;
use crate::controller::ServiceController;
use crate::event_sink::EventSink;
use crate::installer::InstallerRunner;
use crate::protocol::ServiceStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sv_core::service::RuntimeContext;
use sv_core::state::InstallStatus;
use sv_core::{Error, EventRecord, Level, Result, ServiceId, ServiceRegistry, ServiceState};
use sv_platform::{HealthProber, PlatformAdapter, PortRegistry};
use tokio_util::sync::CancellationToken;

pub struct Supervisor {
    registry: ServiceRegistry,
    controllers: HashMap<ServiceId, ServiceController>,
    installer: Arc<InstallerRunner>,
    sink: Arc<dyn EventSink>,
    platform: Arc<dyn PlatformAdapter>,
    port_registry: Arc<PortRegistry>,
    runtime_ctx: parking_lot::Mutex<RuntimeContext>,
    /// Loaded once at construction (spec §3.2): read-only for the lifetime
    /// of this Supervisor. An external settings UI edits the file on disk;
    /// picking up a later edit means restarting the daemon.
    toggles: sv_core::ServiceToggles,
    /// Set for the duration of an install, per spec §4.5: throttles the
    /// periodic refresh from its default 2 s down to a lazier 5 s so the
    /// shared runtime isn't fighting the refresh loop for CPU/I/O.
    heavy_operation: AtomicBool,
}

impl Supervisor {
    pub fn new(
        registry: ServiceRegistry,
        platform: Arc<dyn PlatformAdapter>,
        prober: Arc<dyn HealthProber>,
        sink: Arc<dyn EventSink>,
        state_dir: &std::path::Path,
    ) -> Self {
        let port_registry = Arc::new(PortRegistry::new(platform.clone()));
        let controllers = registry
            .iter()
            .map(|svc| {
                let controller = ServiceController::new(
                    svc.clone(),
                    platform.clone(),
                    prober.clone(),
                    port_registry.clone(),
                    sink.clone(),
                );
                (svc.id.clone(), controller)
            })
            .collect();
        let installer = Arc::new(InstallerRunner::new(sink.clone()));
        let toggles = config::load_toggles(state_dir);

        Self {
            registry,
            controllers,
            installer,
            sink,
            platform,
            port_registry,
            runtime_ctx: parking_lot::Mutex::new(RuntimeContext::default()),
            toggles,
            heavy_operation: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn registry_ports(&self) -> Vec<u16> {
        self.registry.iter().map(|s| s.port).collect()
    }

    fn controller(&self, id: &str) -> Result<&ServiceController> {
        self.controllers.get(id).ok_or_else(|| Error::UnknownService(ServiceId::new(id)))
    }

    fn runtime_ctx(&self) -> RuntimeContext {
        self.runtime_ctx.lock().clone()
    }

    /// Resolves and caches the shared interpreter path once at startup
    /// (spec §4.1). A missing runtime is logged, not fatal: services that
    /// don't need it (compiled assets, the frontend) still start.
    pub async fn resolve_runtime(&self) -> Result<()> {
        match self.platform.find_runtime(3, 12).await {
            Ok(path) => {
                *self.runtime_ctx.lock() = RuntimeContext { runtime_path: Some(path), gpu_available: false };
            }
            Err(e) => {
                self.sink.emit(EventRecord::notice(Level::Warn, format!("no shared runtime found: {e}")));
            }
        }
        Ok(())
    }

    // ---- install ----------------------------------------------------

    pub async fn install_all(&self) -> Vec<(ServiceId, Result<()>)> {
        let ids: Vec<ServiceId> = self.registry.iter().map(|s| s.id.clone()).collect();
        self.install_selected(&ids).await
    }

    /// `core` services (sharing the one interpreter/venv) install
    /// sequentially, in declaration order, to avoid trampling a shared pip
    /// cache; everything else installs concurrently alongside that
    /// sequential phase.
    pub async fn install_selected(&self, ids: &[ServiceId]) -> Vec<(ServiceId, Result<()>)> {
        self.heavy_operation.store(true, Ordering::SeqCst);
        let ctx = self.runtime_ctx();

        let mut results = Vec::new();
        let mut core_ids = Vec::new();
        let mut set = tokio::task::JoinSet::new();

        for id in ids {
            match self.registry.get(id.as_str()) {
                None => results.push((id.clone(), Err(Error::UnknownService(id.clone())))),
                Some(svc) if svc.is_core => core_ids.push(id.clone()),
                Some(_) => match self.controller(id.as_str()) {
                    Ok(controller) => {
                        let controller = controller.clone();
                        let installer = self.installer.clone();
                        let ctx = ctx.clone();
                        let id = id.clone();
                        set.spawn(async move { (id, controller.install(&installer, &ctx).await) });
                    }
                    Err(e) => results.push((id.clone(), Err(e))),
                },
            }
        }

        for id in core_ids {
            let result = match self.controller(id.as_str()) {
                Ok(controller) => controller.install(&self.installer, &ctx).await,
                Err(e) => Err(e),
            };
            results.push((id, result));
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => tracing::warn!(error = %e, "install task panicked"),
            }
        }

        self.heavy_operation.store(false, Ordering::SeqCst);
        results
    }

    // ---- start --------------------------------------------------------

    pub async fn start_one(&self, id: &ServiceId) -> Result<()> {
        let ctx = self.runtime_ctx();
        self.controller(id.as_str())?.start(ctx, &self.installer).await
    }

    /// Starts every directly-startable service whose toggle (if any) doesn't
    /// disable it (spec §3.2: `enable_at_startup`). Services a caller names
    /// explicitly via `start_selected`/`start_one` bypass this check, the
    /// same way `oj`'s `job run` bypasses a paused-by-default runbook entry.
    pub async fn start_all(&self) -> Vec<(ServiceId, Result<()>)> {
        let ids: Vec<ServiceId> = self
            .registry
            .directly_startable()
            .map(|s| &s.id)
            .filter(|id| self.toggles.enabled_at_startup(id.as_str()))
            .cloned()
            .collect();
        self.start_selected(&ids).await
    }

    /// `core` services start concurrently among themselves first (the
    /// gateway needs memory/tools up, but not in any particular order
    /// relative to each other); non-core services then start concurrently.
    /// Services `managed_by_peer` are skipped with a notice rather than an
    /// error, since they have no start recipe of their own.
    pub async fn start_selected(&self, ids: &[ServiceId]) -> Vec<(ServiceId, Result<()>)> {
        let ctx = self.runtime_ctx();
        let mut core_ids = Vec::new();
        let mut rest_ids = Vec::new();
        for id in ids {
            match self.registry.get(id.as_str()) {
                Some(svc) if svc.is_core => core_ids.push(id.clone()),
                _ => rest_ids.push(id.clone()),
            }
        }

        let mut results = self.start_many_concurrently(&core_ids, &ctx).await;
        results.extend(self.start_many_concurrently(&rest_ids, &ctx).await);
        results
    }

    async fn start_many_concurrently(
        &self,
        ids: &[ServiceId],
        ctx: &RuntimeContext,
    ) -> Vec<(ServiceId, Result<()>)> {
        let mut results = Vec::new();
        let mut set = tokio::task::JoinSet::new();

        for id in ids {
            let controller = match self.controller(id.as_str()) {
                Ok(c) => c.clone(),
                Err(e) => {
                    results.push((id.clone(), Err(e)));
                    continue;
                }
            };
            if let Some(mbp) = &controller.service().managed_by_peer {
                self.sink.emit(EventRecord::notice(
                    Level::Info,
                    format!("{id} is managed by {} and was skipped", mbp.peer),
                ));
                continue;
            }
            let id = id.clone();
            let ctx = ctx.clone();
            let installer = self.installer.clone();
            set.spawn(async move { (id, controller.start(ctx, &installer).await) });
        }

        while let Some(joined) = set.join_next().await {
            if let Ok(pair) = joined {
                results.push(pair);
            }
        }
        results
    }

    /// Reclaims every registered port from a process not owned by this
    /// supervisor, before any controller has spawned a child (spec §4.5
    /// startup step 4). Fans out concurrently across the whole registry,
    /// including ports belonging to toggle-disabled or `managed_by_peer`
    /// services, since a crash in a previous run can leave any of them held.
    pub async fn reclaim_orphan_ports(&self) -> sv_platform::Result<HashMap<u16, sv_platform::ReclaimOutcome>> {
        self.port_registry.reclaim_all(&self.registry_ports(), std::process::id()).await
    }

    // ---- stop -----------------------------------------------------------

    pub async fn stop_one(&self, id: &ServiceId) -> Result<()> {
        self.controller(id.as_str())?.stop().await
    }

    pub async fn stop_all(&self) -> Vec<(ServiceId, Result<()>)> {
        let ids: Vec<ServiceId> = self.registry.directly_startable().map(|s| s.id.clone()).collect();
        self.stop_selected(&ids).await
    }

    /// Every service stops concurrently: there is no ordering dependency
    /// tearing down (unlike starting up), and each controller already
    /// serializes its own graceful-then-forceful sequence.
    pub async fn stop_selected(&self, ids: &[ServiceId]) -> Vec<(ServiceId, Result<()>)> {
        let mut results = Vec::new();
        let mut set = tokio::task::JoinSet::new();
        for id in ids {
            let controller = match self.controller(id.as_str()) {
                Ok(c) => c.clone(),
                Err(e) => {
                    results.push((id.clone(), Err(e)));
                    continue;
                }
            };
            let id = id.clone();
            set.spawn(async move { (id, controller.stop().await) });
        }
        while let Some(joined) = set.join_next().await {
            if let Ok(pair) = joined {
                results.push(pair);
            }
        }
        results
    }

    // ---- status -----------------------------------------------------------

    pub fn status_one(&self, id: &ServiceId) -> Result<ServiceStatus> {
        Ok(self.build_status(self.controller(id.as_str())?))
    }

    pub fn status_all(&self) -> Vec<ServiceStatus> {
        self.registry
            .iter()
            .filter_map(|svc| self.controllers.get(&svc.id))
            .map(|c| self.build_status(c))
            .collect()
    }

    fn build_status(&self, controller: &ServiceController) -> ServiceStatus {
        let svc = controller.service();
        let snapshot = controller.snapshot();
        ServiceStatus {
            id: svc.id.clone(),
            display_name: svc.display_name.clone(),
            state: snapshot.state,
            port: svc.port,
            pid: snapshot.pid,
            installed: snapshot
                .install_cache
                .as_ref()
                .map(|c| c.value == InstallStatus::Installed)
                .unwrap_or(false),
            ready_confirmed: snapshot.ready_confirmed,
            last_error: snapshot.last_error,
            managed_by_peer: svc.managed_by_peer.as_ref().map(|m| m.peer.clone()),
        }
    }

    // ---- background refresh ----------------------------------------------

    fn current_refresh_interval(&self) -> Duration {
        if self.heavy_operation.load(Ordering::SeqCst) {
            Duration::from_secs(5)
        } else {
            config::refresh_interval()
        }
    }

    /// One refresh tick: re-evaluates every still-`Running` service. Each
    /// service's reprobe runs as its own spawned task so a single slow
    /// health endpoint can never hold up the others or the next tick.
    async fn refresh_once(&self) {
        self.refresh_all_install_status();
        for svc in self.registry.iter() {
            let Some(controller) = self.controllers.get(&svc.id) else { continue };
            if controller.snapshot().state == ServiceState::Running {
                let controller = controller.clone();
                tokio::spawn(async move { controller.reprobe().await });
            }
        }
    }

    /// Spawns the periodic refresh loop; cancel it via `cancel.cancel()`.
    pub fn spawn_refresh_loop(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let wait = self.current_refresh_interval();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => return,
                }
                self.refresh_once().await;
            }
        })
    }

    /// Refreshes the cached install-status for every service, honoring the
    /// per-controller TTL (spec §3: 5 s). Each check runs as its own spawned
    /// task so a slow/hung interpreter probe for one service can never delay
    /// this tick's reprobes or the next one, and so `status_all`'s
    /// `installed` flag is kept populated for services nobody has explicitly
    /// installed or started in this process.
    pub fn refresh_all_install_status(&self) {
        for svc in self.registry.iter() {
            let Some(controller) = self.controllers.get(&svc.id) else { continue };
            let controller = controller.clone();
            let installer = self.installer.clone();
            tokio::spawn(async move {
                controller.refresh_install_status(&installer).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sink::RecordingSink;
    use sv_core::registry::builtin;
    use sv_platform::fake::FakePlatform;
    use sv_platform::probe::FakeProber;

    fn supervisor(state_dir: &std::path::Path) -> Supervisor {
        let services = builtin(std::path::PathBuf::from("/opt/assistant"));
        let registry = ServiceRegistry::new(services).unwrap();
        let platform = Arc::new(FakePlatform::new());
        let prober = Arc::new(FakeProber::new());
        let sink = Arc::new(RecordingSink::new());
        Supervisor::new(registry, platform, prober, sink, state_dir)
    }

    #[tokio::test]
    async fn starting_llm_directly_reports_managed_by_peer() {
        let dir = tempfile::tempdir().unwrap();
        let sv = supervisor(dir.path());
        let err = sv.start_one(&ServiceId::new("llm")).await.unwrap_err();
        assert!(matches!(err, Error::ManagedByPeer { .. }));
    }

    #[tokio::test]
    async fn status_all_covers_every_registered_service() {
        let dir = tempfile::tempdir().unwrap();
        let sv = supervisor(dir.path());
        assert_eq!(sv.status_all().len(), 9);
    }

    #[tokio::test]
    async fn start_all_skips_a_service_disabled_by_toggle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            config::toggles_path(dir.path()),
            r#"{"frontend": {"enable_at_startup": false}}"#,
        )
        .unwrap();
        let sv = supervisor(dir.path());
        let results = sv.start_all().await;
        assert!(!results.iter().any(|(id, _)| id.as_str() == "frontend"));
    }

    #[tokio::test]
    async fn unknown_service_id_is_reported_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let sv = supervisor(dir.path());
        let results = sv.stop_selected(&[ServiceId::new("nonexistent")]).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_err());
    }
}
