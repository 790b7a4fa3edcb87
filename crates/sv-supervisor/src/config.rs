// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the supervisor crate, in the
//! same shape as the daemon's `env` module: one function per setting, each
//! falling back to a sane default.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a state directory ($HOME is unset)")]
    NoStateDir,
}

/// Resolve the state directory: `SV_STATE_DIR` > `XDG_STATE_HOME/sv` >
/// `$HOME/.local/state/sv`.
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("SV_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("sv"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoStateDir)?;
    Ok(home.join(".local/state/sv"))
}

/// Path to the Unix domain socket the Command API listens on.
pub fn socket_path(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("SV_SOCKET_PATH").map(PathBuf::from).unwrap_or_else(|_| state_dir.join("sv.sock"))
}

/// Path to the persisted per-service toggle file (spec §3.2).
pub fn toggles_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("toggles.json")
}

/// Loads the toggle file if present. Missing file is the common case (no
/// settings UI has run yet) and is silently treated as "everything
/// enabled"; a present-but-malformed file is logged and also treated as
/// empty, since one bad toggle shouldn't block every service from starting.
pub fn load_toggles(state_dir: &std::path::Path) -> sv_core::ServiceToggles {
    let path = toggles_path(state_dir);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return sv_core::ServiceToggles::default(),
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "failed to parse toggles file, ignoring it");
        sv_core::ServiceToggles::default()
    })
}

fn duration_ms_env(key: &str, default: Duration) -> Duration {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(default)
}

/// How long to wait for a graceful `terminate` before tree-killing
/// (spec §4.3: 3 s).
pub fn graceful_stop_timeout() -> Duration {
    duration_ms_env("SV_GRACEFUL_STOP_MS", Duration::from_secs(3))
}

/// How long to wait after a tree-kill before treating the port as still
/// stuck (spec §4.3: 2 s).
pub fn force_kill_timeout() -> Duration {
    duration_ms_env("SV_FORCE_KILL_MS", Duration::from_secs(2))
}

/// Health probe interval while `Starting` (spec §4.3: 1 s).
pub fn health_probe_interval() -> Duration {
    duration_ms_env("SV_HEALTH_PROBE_INTERVAL_MS", Duration::from_secs(1))
}

/// Health probe budget while `Starting` (spec §4.3: 30 s).
pub fn health_probe_budget() -> Duration {
    duration_ms_env("SV_HEALTH_PROBE_BUDGET_MS", Duration::from_secs(30))
}

/// Supervisor's own periodic status refresh interval.
pub fn refresh_interval() -> Duration {
    duration_ms_env("SV_REFRESH_INTERVAL_MS", Duration::from_secs(2))
}

/// TTL for the cached install-status check (spec §3: 5 s).
pub fn install_status_ttl() -> Duration {
    duration_ms_env("SV_INSTALL_STATUS_TTL_MS", Duration::from_secs(5))
}

/// Watchdog liveness poll interval, `T_watch` (spec §4.6: 1 s).
pub fn watchdog_interval() -> Duration {
    duration_ms_env("SV_WATCHDOG_INTERVAL_MS", Duration::from_secs(1))
}

/// Path to the watchdog binary, when it is not a sibling of the running
/// executable.
pub fn watchdog_binary() -> Option<PathBuf> {
    std::env::var("SV_WATCHDOG_BINARY").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn state_dir_prefers_sv_state_dir() {
        std::env::set_var("SV_STATE_DIR", "/tmp/sv-test-state");
        assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/sv-test-state"));
        std::env::remove_var("SV_STATE_DIR");
    }

    #[test]
    #[serial]
    fn duration_env_falls_back_to_default_when_unset() {
        std::env::remove_var("SV_GRACEFUL_STOP_MS");
        assert_eq!(graceful_stop_timeout(), Duration::from_secs(3));
    }

    #[test]
    #[serial]
    fn duration_env_honors_override() {
        std::env::set_var("SV_GRACEFUL_STOP_MS", "1500");
        assert_eq!(graceful_stop_timeout(), Duration::from_millis(1500));
        std::env::remove_var("SV_GRACEFUL_STOP_MS");
    }
}
