// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exercises the real `sv-watchdogd` binary end to end, rather than only its
//! pure functions — a `kill -9`'d supervisor can't be scripted against an
//! in-process test harness, so this spawns the actual executable.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::process::Command;

/// Returns a pid that is guaranteed dead: spawn-and-reap a short-lived child
/// so nothing else can legitimately be holding that pid for the lifetime of
/// this test.
fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().expect("spawn `true`");
    let pid = child.id();
    child.wait().expect("reap `true`");
    pid
}

#[test]
#[cfg(unix)]
fn exits_cleanly_when_the_named_supervisor_is_already_gone() {
    let pid = dead_pid();
    let output = Command::new(env!("CARGO_BIN_EXE_sv-watchdogd"))
        .arg(pid.to_string())
        .env("SV_WATCHDOG_INTERVAL_MS", "20")
        .output()
        .expect("spawn sv-watchdogd");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[test]
#[cfg(unix)]
fn prints_usage_and_fails_with_no_arguments() {
    let output = Command::new(env!("CARGO_BIN_EXE_sv-watchdogd")).output().expect("spawn sv-watchdogd");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage"));
}
