// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A [`PlatformAdapter`] test double: no real processes, ports, or
//! interpreters — just recorded calls and programmable responses, in the
//! spirit of the daemon's `FakeAgentAdapter`.

use crate::adapter::{GroupId, PlatformAdapter};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// One call recorded by [`FakePlatform`], for assertions in controller and
/// supervisor tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    KillTree(u32),
    KillOnPort(u16),
    Attach(GroupId, u32),
    CloseGroup(GroupId),
}

#[derive(Default)]
struct Scripted {
    /// Ports considered occupied (by a foreign PID) until `kill_on_port` is
    /// called for them.
    occupied: Mutex<HashMap<u16, Vec<u32>>>,
    runtime_path: Mutex<Option<PathBuf>>,
}

pub struct FakePlatform {
    calls: Mutex<Vec<PlatformCall>>,
    next_group: AtomicU64,
    next_pid: AtomicU32,
    scripted: Scripted,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_group: AtomicU64::new(1),
            next_pid: AtomicU32::new(1),
            scripted: Scripted::default(),
        }
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    /// Mark `port` as held by `pid` until the test (or the adapter itself,
    /// via `kill_on_port`) clears it.
    pub fn set_occupied(&self, port: u16, pid: u32) {
        self.scripted.occupied.lock().insert(port, vec![pid]);
    }

    pub fn set_runtime_path(&self, path: PathBuf) {
        *self.scripted.runtime_path.lock() = Some(path);
    }

    /// A fresh PID distinct from every other one this fake has handed out,
    /// for tests that need to assert on "the child's pid" without caring
    /// about its actual value.
    pub fn next_fake_pid(&self) -> u32 {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl PlatformAdapter for FakePlatform {
    async fn find_runtime(&self, _max_major: u8, _max_minor: u8) -> Result<PathBuf> {
        Ok(self.scripted.runtime_path.lock().clone().unwrap_or_else(|| PathBuf::from("/fake/python3")))
    }

    async fn kill_tree(&self, pid: u32) -> Result<()> {
        self.calls.lock().push(PlatformCall::KillTree(pid));
        Ok(())
    }

    async fn kill_on_port(&self, port: u16, self_pid: u32) -> Result<usize> {
        self.calls.lock().push(PlatformCall::KillOnPort(port));
        let mut occupied = self.scripted.occupied.lock();
        let pids = occupied.remove(&port).unwrap_or_default();
        Ok(pids.into_iter().filter(|p| *p != self_pid).count())
    }

    async fn pids_on_ports(&self, ports: &[u16]) -> Result<HashMap<u16, Vec<u32>>> {
        let occupied = self.scripted.occupied.lock();
        Ok(ports.iter().map(|p| (*p, occupied.get(p).cloned().unwrap_or_default())).collect())
    }

    fn new_group(&self) -> Result<GroupId> {
        Ok(GroupId(self.next_group.fetch_add(1, Ordering::Relaxed)))
    }

    fn attach(&self, group: GroupId, pid: u32) -> Result<()> {
        self.calls.lock().push(PlatformCall::Attach(group, pid));
        Ok(())
    }

    fn close_group(&self, group: GroupId) -> Result<()> {
        self.calls.lock().push(PlatformCall::CloseGroup(group));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_on_port_clears_scripted_occupancy() {
        let fake = FakePlatform::new();
        fake.set_occupied(8000, 555);
        let killed = fake.kill_on_port(8000, 1).await.unwrap();
        assert_eq!(killed, 1);
        let map = fake.pids_on_ports(&[8000]).await.unwrap();
        assert!(map[&8000].is_empty());
    }

    #[tokio::test]
    async fn records_attach_and_close_calls() {
        let fake = FakePlatform::new();
        let group = fake.new_group().unwrap();
        fake.attach(group, 42).unwrap();
        fake.close_group(group).unwrap();
        assert_eq!(
            fake.calls(),
            vec![PlatformCall::Attach(group, 42), PlatformCall::CloseGroup(group)]
        );
    }
}
