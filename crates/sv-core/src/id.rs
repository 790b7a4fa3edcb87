// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers used throughout the supervisor.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a declared service, e.g. `"gateway"`.
///
/// Service ids are static — they come from the registry, not generated at
/// runtime — so this is a thin wrapper rather than a random-id type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServiceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrows_as_str_for_map_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(ServiceId::new("gateway"), 1);
        assert_eq!(map.get("gateway"), Some(&1));
    }

    #[test]
    fn displays_the_bare_id() {
        assert_eq!(ServiceId::new("gateway").to_string(), "gateway");
    }
}
