// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shutdown: stop every service concurrently, then tear down the background
//! refresh loop. The watchdog process is left running deliberately; it
//! notices our exit on its own liveness poll and reclaims any leftover ports
//! itself, so cleanup still happens even if the stop loop above panics or
//! this process is killed partway through shutdown.

use super::startup::StartupHandles;
use crate::supervisor::Supervisor;
use std::sync::Arc;
use sv_core::{EventRecord, Level};

pub async fn run(supervisor: &Arc<Supervisor>, handles: StartupHandles) {
    for (id, result) in supervisor.stop_all().await {
        if let Err(e) = result {
            supervisor.sink().emit(EventRecord::notice(Level::Warn, format!("{id} failed to stop cleanly: {e}")));
        }
    }

    handles.refresh.abort();
}
