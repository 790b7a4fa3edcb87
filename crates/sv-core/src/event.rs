// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event records emitted by the supervisor for UIs and log sinks (spec §6).

use crate::id::ServiceId;
use crate::state::ServiceState;
use serde::{Deserialize, Serialize};

/// Severity of a [`EventRecord::Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    Level {
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// One line emitted by a managed process's stdout or stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Something worth telling the outside world about. Broadcast to IPC
/// subscribers and mirrored into the `tracing` log, the way oj-daemon
/// splits its event bus from its structured log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventRecord {
    LogLine { service: ServiceId, stream: Stream, line: String },
    StateChanged {
        service: ServiceId,
        from: ServiceState,
        to: ServiceState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    InstallProgress { service: ServiceId, line: String },
    Notice { level: Level, message: String },
}

impl EventRecord {
    pub fn state_changed(service: ServiceId, from: ServiceState, to: ServiceState) -> Self {
        Self::StateChanged { service, from, to, reason: None }
    }

    /// A transition that was caused by something worth explaining — a crash,
    /// a failed spawn — so a UI subscribed only to the event stream (spec §6)
    /// doesn't have to separately poll status to learn why.
    pub fn state_changed_with_reason(
        service: ServiceId,
        from: ServiceState,
        to: ServiceState,
        reason: impl Into<String>,
    ) -> Self {
        Self::StateChanged { service, from, to, reason: Some(reason.into()) }
    }

    pub fn notice(level: Level, message: impl Into<String>) -> Self {
        Self::Notice { level, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_a_kind_tag() {
        let ev = EventRecord::notice(Level::Warn, "port already taken");
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"kind\":\"notice\""));
        assert!(json.contains("\"level\":\"warn\""));
    }

    #[test]
    fn state_changed_round_trips_through_json() {
        let ev = EventRecord::state_changed(
            ServiceId::new("gateway"),
            ServiceState::Starting,
            ServiceState::Running,
        );
        let json = serde_json::to_string(&ev).unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        match back {
            EventRecord::StateChanged { service, from, to, reason } => {
                assert_eq!(service.as_str(), "gateway");
                assert_eq!(from, ServiceState::Starting);
                assert_eq!(to, ServiceState::Running);
                assert!(reason.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn state_changed_with_reason_carries_the_error_text() {
        let ev = EventRecord::state_changed_with_reason(
            ServiceId::new("gateway"),
            ServiceState::Running,
            ServiceState::Error,
            "exited with status 1",
        );
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("exited with status 1"));
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        match back {
            EventRecord::StateChanged { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("exited with status 1"));
            }
            _ => panic!("wrong variant"),
        }
    }
}
