// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tree-kill and port-kill primitives shared by `kill_tree`, `kill_on_port`,
//! and `pids_on_ports`, built on `sysinfo` (process enumeration) and
//! `netstat2` (port → PID mapping).

use crate::error::{PlatformError, Result};
use std::collections::{HashMap, HashSet};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Every PID in `system` whose ancestor chain includes `root`, plus `root`
/// itself. Ordered so descendants precede ancestors (safe to kill in order
/// without losing track of a still-alive parent).
fn descendants(system: &System, root: u32) -> Vec<u32> {
    let root_pid = Pid::from_u32(root);
    let mut children_of: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, proc_) in system.processes() {
        if let Some(parent) = proc_.parent() {
            children_of.entry(parent).or_default().push(*pid);
        }
    }

    let mut out = Vec::new();
    let mut stack = vec![root_pid];
    let mut seen = HashSet::new();
    while let Some(pid) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        if let Some(kids) = children_of.get(&pid) {
            stack.extend(kids.iter().copied());
        }
        out.push(pid);
    }
    // Reverse so leaves come first: a parent that loses its children still
    // has a shrinking process table to walk, not a stale reference.
    out.reverse();
    out.into_iter().map(|p| p.as_u32()).collect()
}

#[cfg(unix)]
fn terminate_gracefully(system: &System, pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    if system.process(Pid::from_u32(pid)).is_some() {
        let _ = signal::kill(NixPid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate_gracefully(_system: &System, _pid: u32) {}

fn force_kill(system: &System, pid: u32) {
    if let Some(proc_) = system.process(Pid::from_u32(pid)) {
        proc_.kill();
    }
}

/// Terminate `pid` and every transitive descendant. Signals the tree
/// gracefully first (Unix only — Windows has no polite-signal equivalent
/// for arbitrary processes), then force-kills whatever is still alive.
/// Never touches `pid == std::process::id()`.
pub async fn kill_tree(pid: u32) -> Result<()> {
    if pid == std::process::id() {
        return Ok(());
    }
    let mut system = System::new_all();
    system.refresh_processes(ProcessesToUpdate::All, true);
    let tree = descendants(&system, pid);

    for &p in &tree {
        terminate_gracefully(&system, p);
    }
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    system.refresh_processes(ProcessesToUpdate::All, true);
    for &p in &tree {
        force_kill(&system, p);
    }
    Ok(())
}

/// Map each of `ports` to the PIDs currently holding a listening socket on
/// it, via `netstat2`'s socket table.
pub async fn pids_on_ports(ports: &[u16]) -> Result<HashMap<u16, Vec<u32>>> {
    let wanted: HashSet<u16> = ports.iter().copied().collect();
    let sockets = netstat2::get_sockets_info(
        netstat2::AddressFamilyFlags::IPV4 | netstat2::AddressFamilyFlags::IPV6,
        netstat2::ProtocolFlags::TCP,
    )
    .map_err(|_| PlatformError::PortScanFailed(*ports.first().unwrap_or(&0)))?;

    let mut out: HashMap<u16, Vec<u32>> = HashMap::new();
    for socket in sockets {
        let netstat2::ProtocolSocketInfo::Tcp(tcp) = &socket.protocol_socket_info else {
            continue;
        };
        if tcp.state != netstat2::TcpState::Listen {
            continue;
        }
        let port = tcp.local_port;
        if !wanted.contains(&port) {
            continue;
        }
        out.entry(port).or_default().extend(socket.associated_pids.iter().copied());
    }
    for port in ports {
        out.entry(*port).or_default();
    }
    Ok(out)
}

/// Kill every process listening on `port`, tree-killing each. Returns how
/// many distinct PIDs were targeted. Never kills `self_pid`.
pub async fn kill_on_port(port: u16, self_pid: u32) -> Result<usize> {
    let map = pids_on_ports(&[port]).await?;
    let pids: Vec<u32> =
        map.get(&port).cloned().unwrap_or_default().into_iter().filter(|p| *p != self_pid).collect();
    for pid in &pids {
        kill_tree(*pid).await?;
    }
    Ok(pids.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_tree_refuses_to_kill_self() {
        // No direct assertion possible without touching the real process
        // table, but calling with our own PID must be a guaranteed no-op.
        kill_tree(std::process::id()).await.unwrap();
    }
}
