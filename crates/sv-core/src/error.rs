// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The crate-wide error enum covering every failure mode described in spec §7.

use crate::id::ServiceId;
use thiserror::Error;

/// Everything that can go wrong while installing, starting, probing, or
/// stopping a service, plus the supervisor-level rejections around those
/// operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{service} is not installed: {reason}")]
    NotInstalled { service: ServiceId, reason: String },

    #[error("port {port} for {service} is already in use by another process")]
    PortOccupied { service: ServiceId, port: u16 },

    #[error("failed to spawn {service}: {source}")]
    SpawnFailed {
        service: ServiceId,
        #[source]
        source: std::io::Error,
    },

    #[error("{service} exited during startup with status {status}: {tail}")]
    StartupExit { service: ServiceId, status: String, tail: String },

    #[error("{service} did not stop within the grace period and had to be killed")]
    StopTimeout { service: ServiceId },

    #[error("{service} is managed by {peer} and cannot be started or stopped directly")]
    ManagedByPeer { service: ServiceId, peer: ServiceId },

    #[error("install failed for {service}: {reason}")]
    InstallFailed { service: ServiceId, reason: String },

    #[error("no suitable runtime found for {service}")]
    RuntimeUnavailable { service: ServiceId },

    #[error("{service} is busy with another operation")]
    Busy { service: ServiceId },

    #[error("unknown service id: {0}")]
    UnknownService(ServiceId),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_service() {
        let err = Error::Busy { service: ServiceId::new("gateway") };
        assert!(err.to_string().contains("gateway"));
    }

    #[test]
    fn managed_by_peer_names_both_services() {
        let err = Error::ManagedByPeer {
            service: ServiceId::new("llm"),
            peer: ServiceId::new("gateway"),
        };
        let msg = err.to_string();
        assert!(msg.contains("llm"));
        assert!(msg.contains("gateway"));
    }
}
