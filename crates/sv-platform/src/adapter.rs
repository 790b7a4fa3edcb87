// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Platform Adapter: OS-specific primitives behind one trait so the
//! Supervisor never branches on `cfg(unix)`/`cfg(windows)` itself.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// Opaque handle to a process-group/job-object primitive. What it wraps is
/// adapter-specific; callers only ever pass it back into `attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupId(pub u64);

/// Capabilities a Service Controller and the Supervisor need from the
/// underlying OS, behind one seam (mirrors how `AgentAdapter` in the daemon
/// this was modeled on hides agent-runtime differences behind one trait).
#[async_trait]
pub trait PlatformAdapter: Send + Sync + 'static {
    /// Locate the highest-versioned runtime of the requested family at or
    /// below `max_minor`, falling back to the current process's own
    /// interpreter if nothing else is found.
    async fn find_runtime(&self, max_major: u8, max_minor: u8) -> Result<PathBuf>;

    /// Terminate `pid` and every transitive descendant. Idempotent: killing
    /// an already-dead tree is not an error.
    async fn kill_tree(&self, pid: u32) -> Result<()>;

    /// Terminate every process with a listening socket on `port`. Returns
    /// the number of processes actually killed. Never kills `self_pid`.
    async fn kill_on_port(&self, port: u16, self_pid: u32) -> Result<usize>;

    /// Read-only: map each requested port to the PIDs currently listening
    /// on it.
    async fn pids_on_ports(&self, ports: &[u16]) -> Result<HashMap<u16, Vec<u32>>>;

    /// Allocate a new process-group/job-object primitive.
    fn new_group(&self) -> Result<GroupId>;

    /// Attach `pid` to `group`. Best-effort: a failure is logged by the
    /// caller but must never be treated as fatal to the child's lifecycle.
    fn attach(&self, group: GroupId, pid: u32) -> Result<()>;

    /// Close a process-group/job-object primitive. On platforms with a
    /// job-object semantic this reaps any stragglers still attached.
    fn close_group(&self, group: GroupId) -> Result<()>;
}
