// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration and IPC: turns the declarative [`sv_core::ServiceRegistry`]
//! and the OS primitives in `sv-platform` into a running supervisor daemon
//! with a Unix-socket Command API.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod controller;
pub mod event_sink;
pub mod installer;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod supervisor;

pub use controller::ServiceController;
pub use event_sink::{BroadcastSink, EventSink, RecordingSink};
pub use installer::InstallerRunner;
pub use protocol::{Request, Response, ServiceStatus};
pub use supervisor::Supervisor;
