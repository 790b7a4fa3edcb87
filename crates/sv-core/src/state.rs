// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-service state machine and its runtime record.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// One of the five states a [`crate::service::Service`] can be in.
///
/// ```text
/// Stopped ──start──▶ Starting ──ready──▶ Running
///    ▲                   │                  │
///    │                   └──exit/fail──▶ Error
///    │                                      │
///    └──────────stop (kill)─────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

crate::simple_display! {
    ServiceState {
        Stopped => "stopped",
        Starting => "starting",
        Running => "running",
        Stopping => "stopping",
        Error => "error",
    }
}

impl ServiceState {
    /// States in which a child process handle must be present (invariant 2/3
    /// from spec §8).
    pub fn expects_child(self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Running | ServiceState::Stopping)
    }
}

/// Default cap on the per-service output ring buffer (UI log tabs).
pub const OUTPUT_RING_CAPACITY: usize = 500;

/// Number of trailing output lines retained in a `StartupExit`/crash error
/// (spec §8 boundary behavior: "the last N output lines (N = 30)").
pub const ERROR_TAIL_LINES: usize = 30;

/// A bounded FIFO of recent output lines.
#[derive(Debug, Clone, Default)]
pub struct OutputRing {
    lines: VecDeque<String>,
    capacity: usize,
    elided: u64,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self { lines: VecDeque::with_capacity(capacity), capacity, elided: 0 }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.elided += 1;
        }
        self.lines.push_back(line);
    }

    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn elided_count(&self) -> u64 {
        self.elided
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.elided = 0;
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Cached result of an install-status check, with a 5s TTL (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallStatus {
    Installed,
    NotInstalled,
    Error,
}

#[derive(Debug, Clone)]
pub struct InstallStatusCache {
    pub value: InstallStatus,
    pub reason: String,
    expiry_ms: u64,
}

impl InstallStatusCache {
    pub fn new(value: InstallStatus, reason: String, ttl_ms: u64) -> Self {
        Self { value, reason, expiry_ms: now_ms() + ttl_ms }
    }

    pub fn is_expired(&self) -> bool {
        now_ms() >= self.expiry_ms
    }
}

/// Mutated only by the owning service's Controller. Everything the
/// Supervisor shows for one service.
#[derive(Debug, Clone)]
pub struct RuntimeRecord {
    pub state: ServiceState,
    /// Present iff `state` is `Starting`/`Running`/`Stopping`.
    pub pid: Option<u32>,
    /// Present iff `state` is `Starting`/`Running`.
    pub start_time_ms: Option<u64>,
    /// Present iff `state` is `Error`.
    pub last_error: Option<String>,
    pub output: OutputRing,
    pub ready_confirmed: bool,
    pub install_cache: Option<InstallStatusCache>,
}

impl Default for RuntimeRecord {
    fn default() -> Self {
        Self {
            state: ServiceState::Stopped,
            pid: None,
            start_time_ms: None,
            last_error: None,
            output: OutputRing::new(OUTPUT_RING_CAPACITY),
            ready_confirmed: false,
            install_cache: None,
        }
    }
}

impl RuntimeRecord {
    pub fn mark_starting(&mut self, pid: u32) {
        self.state = ServiceState::Starting;
        self.pid = Some(pid);
        self.start_time_ms = Some(now_ms());
        self.ready_confirmed = false;
        self.last_error = None;
    }

    pub fn mark_running(&mut self, ready: bool) {
        self.state = ServiceState::Running;
        self.ready_confirmed = ready;
    }

    pub fn mark_stopping(&mut self) {
        self.state = ServiceState::Stopping;
    }

    pub fn mark_stopped(&mut self) {
        self.state = ServiceState::Stopped;
        self.pid = None;
        self.start_time_ms = None;
        self.ready_confirmed = false;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.state = ServiceState::Error;
        self.pid = None;
        self.start_time_ms = None;
        self.ready_confirmed = false;
        self.last_error = Some(message.into());
    }

    /// invariant 2/3 from spec §8, checkable in tests against a live record.
    pub fn upholds_child_presence_invariant(&self) -> bool {
        self.state.expects_child() == self.pid.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_and_counts_elision() {
        let mut ring = OutputRing::new(2);
        ring.push("a".into());
        ring.push("b".into());
        ring.push("c".into());
        assert_eq!(ring.all(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(ring.elided_count(), 1);
    }

    #[test]
    fn tail_returns_at_most_n_most_recent() {
        let mut ring = OutputRing::new(10);
        for i in 0..5 {
            ring.push(i.to_string());
        }
        assert_eq!(ring.tail(2), vec!["3".to_string(), "4".to_string()]);
    }

    #[test]
    fn record_transitions_uphold_child_presence_invariant() {
        let mut rec = RuntimeRecord::default();
        assert!(rec.upholds_child_presence_invariant());
        rec.mark_starting(123);
        assert!(rec.upholds_child_presence_invariant());
        rec.mark_running(true);
        assert!(rec.upholds_child_presence_invariant());
        rec.mark_stopping();
        assert!(rec.upholds_child_presence_invariant());
        rec.mark_stopped();
        assert!(rec.upholds_child_presence_invariant());
        assert!(!rec.state.expects_child());
    }

    #[test]
    fn error_clears_pid_and_ready_confirmed() {
        let mut rec = RuntimeRecord::default();
        rec.mark_starting(1);
        rec.mark_running(true);
        rec.mark_error("crashed");
        assert_eq!(rec.state, ServiceState::Error);
        assert!(rec.pid.is_none());
        assert!(!rec.ready_confirmed);
        assert_eq!(rec.last_error.as_deref(), Some("crashed"));
    }
}
