// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The production [`PlatformAdapter`]: real OS primitives.

use crate::adapter::{GroupId, PlatformAdapter};
use crate::error::Result;
use crate::group::GroupTable;
use crate::{kill, runtime};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct SystemPlatform {
    groups: GroupTable,
    runtime_name: String,
}

impl SystemPlatform {
    /// `runtime_name` is the interpreter family to probe for, e.g.
    /// `"python"` (tried as `python3.12`, `python3.11`, ...).
    pub fn new(runtime_name: impl Into<String>) -> Self {
        Self { groups: GroupTable::new(), runtime_name: runtime_name.into() }
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new("python")
    }
}

#[async_trait]
impl PlatformAdapter for SystemPlatform {
    async fn find_runtime(&self, max_major: u8, max_minor: u8) -> Result<PathBuf> {
        runtime::find_runtime(&self.runtime_name, max_major, max_minor).await
    }

    async fn kill_tree(&self, pid: u32) -> Result<()> {
        kill::kill_tree(pid).await
    }

    async fn kill_on_port(&self, port: u16, self_pid: u32) -> Result<usize> {
        kill::kill_on_port(port, self_pid).await
    }

    async fn pids_on_ports(&self, ports: &[u16]) -> Result<HashMap<u16, Vec<u32>>> {
        kill::pids_on_ports(ports).await
    }

    fn new_group(&self) -> Result<GroupId> {
        self.groups.new_group()
    }

    fn attach(&self, group: GroupId, pid: u32) -> Result<()> {
        self.groups.attach(group, pid)
    }

    fn close_group(&self, group: GroupId) -> Result<()> {
        self.groups.close(group)
    }
}
