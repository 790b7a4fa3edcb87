// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the Command API: newline-delimited JSON requests and
//! responses over the Unix domain socket, structurally modeled on the
//! daemon's own request/response protocol.

use serde::{Deserialize, Serialize};
use sv_core::{ServiceId, ServiceState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Install { ids: Vec<ServiceId> },
    InstallAll,
    Start { id: ServiceId },
    StartSelected { ids: Vec<ServiceId> },
    StartAll,
    Stop { id: ServiceId },
    StopAll,
    StatusAll,
}

/// A runtime record snapshot plus the two booleans derived for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub id: ServiceId,
    pub display_name: String,
    pub state: ServiceState,
    pub port: u16,
    pub pid: Option<u32>,
    pub installed: bool,
    pub ready_confirmed: bool,
    pub last_error: Option<String>,
    pub managed_by_peer: Option<ServiceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ack,
    Status { services: Vec<ServiceStatus> },
    Error { message: String },
}

impl Response {
    pub fn from_result<T>(result: Result<T, sv_core::Error>, ok: impl FnOnce(T) -> Response) -> Response {
        match result {
            Ok(value) => ok(value),
            Err(e) => Response::Error { message: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = Request::Start { id: ServiceId::new("gateway") };
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        match back {
            Request::Start { id } => assert_eq!(id.as_str(), "gateway"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn response_error_carries_a_message() {
        let resp = Response::Error { message: "busy".to_string() };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("busy"));
    }
}
