// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime discovery: locate the highest-versioned interpreter of a given
//! family at or below a requested minor version.
//!
//! Grounded on the original launcher's `find_latest_python`: on Windows,
//! consult the `py` version launcher; elsewhere probe `name{major}.{minor}`
//! binaries directly; fall back to the supervisor's own interpreter as a
//! last resort.

use crate::error::{PlatformError, Result};
use std::path::PathBuf;
use tokio::process::Command;

/// Find the highest `{name}{major}.{minor}` binary on `PATH` with
/// `major == max_major` and `minor <= max_minor`, confirming each candidate
/// actually reports that version before accepting it.
pub async fn find_runtime(name: &str, max_major: u8, max_minor: u8) -> Result<PathBuf> {
    #[cfg(windows)]
    if let Some(path) = find_via_version_launcher(max_major, max_minor).await {
        return Ok(path);
    }

    let mut best: Option<(u8, PathBuf)> = None;
    for minor in (0..=max_minor).rev() {
        let candidate = format!("{name}{max_major}.{minor}");
        if let Some(path) = verify_candidate(&candidate, max_major, minor).await {
            best = Some((minor, path));
            break;
        }
    }

    if let Some((_, path)) = best {
        return Ok(path);
    }

    Ok(std::env::current_exe().unwrap_or_else(|_| PathBuf::from(name)))
}

async fn verify_candidate(candidate: &str, major: u8, minor: u8) -> Option<PathBuf> {
    let output = Command::new(candidate).arg("--version").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let expect = format!("Python {major}.{minor}");
    if text.trim().starts_with(&expect) {
        which(candidate)
    } else {
        None
    }
}

fn which(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(program)).find(|p| p.is_file())
}

#[cfg(windows)]
async fn find_via_version_launcher(max_major: u8, max_minor: u8) -> Option<PathBuf> {
    let output = Command::new("py").arg("--list").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let mut best_minor = None;
    for line in text.lines() {
        let line = line.trim().trim_start_matches('-').trim_start_matches('*').trim();
        if let Some(rest) = line.strip_prefix("V:") {
            if let Some((major_s, minor_s)) = rest.split_once('.') {
                if let (Ok(major), Ok(minor)) = (major_s.parse::<u8>(), minor_s.trim().split_whitespace().next().unwrap_or("").parse::<u8>()) {
                    if major == max_major && minor <= max_minor {
                        best_minor = best_minor.map(|m: u8| m.max(minor)).or(Some(minor));
                    }
                }
            }
        }
    }
    let minor = best_minor?;
    let spec = format!("-{max_major}.{minor}");
    let output = Command::new("py")
        .arg(&spec)
        .arg("-c")
        .arg("import sys; print(sys.executable)")
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() { None } else { Some(PathBuf::from(path)) }
}

/// Convenience wrapper returning [`PlatformError::RuntimeNotFound`] instead
/// of the current-interpreter fallback, for callers that must treat "no
/// dedicated runtime" as an error rather than silently reusing our own.
pub async fn require_runtime(name: &str, max_major: u8, max_minor: u8) -> Result<PathBuf> {
    let path = find_runtime(name, max_major, max_minor).await?;
    if path == std::env::current_exe().unwrap_or_default() {
        return Err(PlatformError::RuntimeNotFound(max_minor));
    }
    Ok(path)
}
