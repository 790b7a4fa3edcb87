// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup: resolve the shared runtime, spawn the watchdog so it is already
//! watching before any child exists, reclaim orphaned ports left by a prior
//! unclean exit, then start every directly-startable service (core services
//! concurrently, then the rest concurrently) and bring up the background
//! refresh loop.

use crate::config;
use crate::supervisor::Supervisor;
use std::process::Stdio;
use std::sync::Arc;
use sv_core::{EventRecord, Level};
use tokio_util::sync::CancellationToken;

pub struct StartupHandles {
    pub refresh: tokio::task::JoinHandle<()>,
    pub watchdog: Option<tokio::process::Child>,
}

pub async fn run(supervisor: &Arc<Supervisor>, cancel: CancellationToken) -> StartupHandles {
    supervisor.resolve_runtime().await.ok();

    let watchdog = spawn_watchdog(supervisor).await;
    if watchdog.is_none() {
        supervisor.sink().emit(EventRecord::notice(
            Level::Warn,
            "watchdog process not started; ports will not be reclaimed if this process dies uncleanly".to_string(),
        ));
    }

    if let Err(e) = supervisor.reclaim_orphan_ports().await {
        supervisor
            .sink()
            .emit(EventRecord::notice(Level::Warn, format!("orphan port cleanup failed: {e}")));
    }

    for (id, result) in supervisor.start_all().await {
        if let Err(e) = result {
            supervisor.sink().emit(EventRecord::notice(Level::Warn, format!("{id} failed to start: {e}")));
        }
    }

    let refresh = supervisor.clone().spawn_refresh_loop(cancel);

    StartupHandles { refresh, watchdog }
}

/// Spawns `sv-watchdogd` as a detached child so it outlives us if we crash.
/// It is handed our own pid and every declared port and polls our liveness
/// independently (spec §4.6).
async fn spawn_watchdog(supervisor: &Arc<Supervisor>) -> Option<tokio::process::Child> {
    let binary = config::watchdog_binary().or_else(|| {
        std::env::current_exe().ok().and_then(|p| p.parent().map(|dir| dir.join("sv-watchdogd")))
    })?;

    let mut command = tokio::process::Command::new(binary);
    command
        .arg(std::process::id().to_string())
        .args(supervisor.registry_ports().iter().map(|p| p.to_string()))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // The watchdog's entire purpose is to outlive us; it must not be
        // reaped just because our own `Child` handle was dropped.
        .kill_on_drop(false);

    command.spawn().ok()
}
