// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sv-watchdogd`: a small, independent process that outlives the
//! supervisor it watches. It polls the supervisor's pid for liveness and,
//! the moment it's gone, kills whatever is still listening on the
//! supervisor's declared ports, then exits. It holds no handle to the
//! supervisor and joins no process group of its, so nothing that kills the
//! supervisor's tree can take the watchdog down with it (spec §4.6).
//!
//! Invocation: `sv-watchdogd <supervisor_pid> <port> [<port> ...]`

use std::time::Duration;
use sv_platform::{PlatformAdapter, SystemPlatform};
use tracing_subscriber::EnvFilter;

fn watch_interval() -> Duration {
    std::env::var("SV_WATCHDOG_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

/// Best-effort: become our own session leader so a terminal hangup, or a
/// signal sent to the supervisor's process group, never reaches us.
#[cfg(unix)]
fn detach_from_controlling_terminal() {
    let _ = nix::unistd::setsid();
}

#[cfg(not(unix))]
fn detach_from_controlling_terminal() {}

#[cfg(unix)]
fn pid_is_alive(pid: i32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;
    // Sending no signal (`None`) only checks for existence/permission.
    signal::kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn pid_is_alive(pid: i32) -> bool {
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    system.process(sysinfo::Pid::from_u32(pid as u32)).is_some()
}

fn parse_args() -> Option<(i32, Vec<u16>)> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        return None;
    }
    let supervisor_pid = args[0].parse().ok()?;
    let ports = args[1..].iter().filter_map(|s| s.parse().ok()).collect();
    Some((supervisor_pid, ports))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some((supervisor_pid, ports)) = parse_args() else {
        eprintln!("usage: sv-watchdogd <supervisor_pid> <port> [<port> ...]");
        std::process::exit(2);
    };

    detach_from_controlling_terminal();
    tracing::info!(supervisor_pid, ?ports, "watchdog started");

    let platform = SystemPlatform::default();
    let self_pid = std::process::id();
    let interval = watch_interval();

    loop {
        tokio::time::sleep(interval).await;
        if pid_is_alive(supervisor_pid) {
            continue;
        }

        tracing::warn!(supervisor_pid, "supervisor is no longer alive, reclaiming its ports");
        for port in &ports {
            if let Err(e) = platform.kill_on_port(*port, self_pid).await {
                tracing::warn!(port, error = %e, "failed to reclaim port");
            }
        }
        break;
    }
}
