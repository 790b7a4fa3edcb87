// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Process Group Manager: the OS grouping primitive allocated once at
//! startup, with each spawned child attached to it so descendants die with
//! the supervisor.
//!
//! Unix and Windows have genuinely different primitives (process groups vs.
//! job objects), so the platform-specific halves live in their own
//! sub-modules behind the same `GroupTable` surface.

use crate::adapter::GroupId;
use crate::error::{PlatformError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(unix)]
mod imp {
    use super::*;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    /// On Unix each child is placed in its own session via
    /// `command_group`'s `AsyncCommandGroup`, so "the group" is really the
    /// set of child PGIDs the supervisor has been told about. `attach`
    /// records the PGID (equal to the child's PID after `setsid`); closing
    /// the group best-effort SIGTERMs every PGID still registered.
    #[derive(Default)]
    pub struct PlatformGroup {
        pgids: Vec<i32>,
    }

    impl PlatformGroup {
        pub fn create() -> Result<Self> {
            Ok(Self::default())
        }
    }

    pub fn attach(group: &mut PlatformGroup, pid: u32) -> Result<()> {
        group.pgids.push(pid as i32);
        Ok(())
    }

    pub fn close(group: &PlatformGroup) -> Result<()> {
        for pgid in &group.pgids {
            // Best-effort: the child may already have exited.
            let _ = signal::killpg(Pid::from_raw(*pgid), Signal::SIGTERM);
        }
        Ok(())
    }
}

// The Win32 job-object API has no safe wrapper in this dependency tree;
// every call here is a direct, checked FFI invocation.
#[cfg(windows)]
#[allow(unsafe_code)]
mod imp {
    use super::*;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::System::JobObjects::{
        AssignProcessToJobObject, CreateJobObjectW, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
        JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE, JobObjectExtendedLimitInformation,
        SetInformationJobObject,
    };
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_ALL_ACCESS};

    pub struct PlatformGroup {
        handle: HANDLE,
    }

    // The raw HANDLE is just an integer token for the kernel object; sharing
    // it across threads behind our own mutex is sound.
    unsafe impl Send for PlatformGroup {}
    unsafe impl Sync for PlatformGroup {}

    impl PlatformGroup {
        pub fn create() -> Result<Self> {
            let handle = unsafe { CreateJobObjectW(std::ptr::null_mut(), std::ptr::null()) };
            if handle == 0 {
                return Err(PlatformError::GroupFailed("CreateJobObjectW failed".into()));
            }
            let mut limits: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = unsafe { std::mem::zeroed() };
            limits.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
            let ok = unsafe {
                SetInformationJobObject(
                    handle,
                    JobObjectExtendedLimitInformation,
                    &mut limits as *mut _ as *mut _,
                    std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
                )
            };
            if ok == 0 {
                unsafe { CloseHandle(handle) };
                return Err(PlatformError::GroupFailed("SetInformationJobObject failed".into()));
            }
            Ok(Self { handle })
        }
    }

    pub fn attach(group: &mut PlatformGroup, pid: u32) -> Result<()> {
        let proc = unsafe { OpenProcess(PROCESS_ALL_ACCESS, 0, pid) };
        if proc == 0 {
            return Err(PlatformError::GroupFailed(format!("OpenProcess({pid}) failed")));
        }
        let ok = unsafe { AssignProcessToJobObject(group.handle, proc) };
        unsafe { CloseHandle(proc) };
        if ok == 0 {
            return Err(PlatformError::GroupFailed("AssignProcessToJobObject failed".into()));
        }
        Ok(())
    }

    pub fn close(group: &PlatformGroup) -> Result<()> {
        unsafe { CloseHandle(group.handle) };
        Ok(())
    }

    impl Drop for PlatformGroup {
        fn drop(&mut self) {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

/// In-process table mapping opaque [`GroupId`]s to platform group state.
#[derive(Default)]
pub struct GroupTable {
    next_id: AtomicU64,
    groups: Mutex<HashMap<u64, imp::PlatformGroup>>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), groups: Mutex::new(HashMap::new()) }
    }

    pub fn new_group(&self) -> Result<GroupId> {
        let group = imp::PlatformGroup::create()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.groups.lock().insert(id, group);
        Ok(GroupId(id))
    }

    pub fn attach(&self, group: GroupId, pid: u32) -> Result<()> {
        let mut groups = self.groups.lock();
        let entry = groups
            .get_mut(&group.0)
            .ok_or_else(|| PlatformError::GroupFailed(format!("unknown group {}", group.0)))?;
        imp::attach(entry, pid)
    }

    pub fn close(&self, group: GroupId) -> Result<()> {
        let mut groups = self.groups.lock();
        if let Some(entry) = groups.remove(&group.0) {
            imp::close(&entry)?;
        }
        Ok(())
    }
}
