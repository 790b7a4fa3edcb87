// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted per-service toggle set (spec §3.2): a small, externally
//! written settings file the Supervisor reads but never writes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceToggle {
    /// Whether `start_all` should include this service. Absent means "yes".
    #[serde(default)]
    pub enable_at_startup: Option<bool>,
}

/// `{ "<service_id>": { "<option>": <scalar> } }`, loaded once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceToggles(HashMap<String, ServiceToggle>);

impl ServiceToggles {
    pub fn enabled_at_startup(&self, id: &str) -> bool {
        self.0.get(id).and_then(|t| t.enable_at_startup).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_defaults_to_enabled() {
        let toggles = ServiceToggles::default();
        assert!(toggles.enabled_at_startup("gateway"));
    }

    #[test]
    fn explicit_false_disables_at_startup() {
        let toggles: ServiceToggles =
            serde_json::from_str(r#"{"frontend": {"enable_at_startup": false}}"#).unwrap();
        assert!(!toggles.enabled_at_startup("frontend"));
        assert!(toggles.enabled_at_startup("gateway"));
    }
}
