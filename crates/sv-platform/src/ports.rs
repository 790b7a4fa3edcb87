// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Port Registry: occupancy scanning and reclamation over the
//! declared service ports. Owns no mutable state of its own — it is a thin
//! policy layer over [`PlatformAdapter`].

use crate::adapter::PlatformAdapter;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default retry budget for `reclaim`: `T_free = 2s * R_max`.
pub const DEFAULT_R_MAX: u32 = 5;
pub const RECLAIM_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    Freed,
    StillOccupied,
}

pub struct PortRegistry {
    platform: Arc<dyn PlatformAdapter>,
    r_max: u32,
}

impl PortRegistry {
    pub fn new(platform: Arc<dyn PlatformAdapter>) -> Self {
        Self { platform, r_max: DEFAULT_R_MAX }
    }

    pub fn with_r_max(platform: Arc<dyn PlatformAdapter>, r_max: u32) -> Self {
        Self { platform, r_max }
    }

    pub async fn scan(&self, ports: &[u16]) -> Result<HashMap<u16, Vec<u32>>> {
        self.platform.pids_on_ports(ports).await
    }

    /// Kill whoever holds `port`, then re-check up to `r_max` times,
    /// 2 seconds apart, re-invoking the kill if a new process has taken the
    /// port in the interim.
    pub async fn reclaim(&self, port: u16, self_pid: u32) -> Result<ReclaimOutcome> {
        reclaim_port(self.platform.clone(), port, self_pid, self.r_max).await
    }

    /// Fan out `reclaim` over every port concurrently — one task per port,
    /// bounded by the port count itself (never more than a handful of
    /// declared services).
    pub async fn reclaim_all(
        &self,
        ports: &[u16],
        self_pid: u32,
    ) -> Result<HashMap<u16, ReclaimOutcome>> {
        let mut set = tokio::task::JoinSet::new();
        for &port in ports {
            let platform = self.platform.clone();
            let r_max = self.r_max;
            set.spawn(async move { (port, reclaim_port(platform, port, self_pid, r_max).await) });
        }

        let mut out = HashMap::new();
        while let Some(joined) = set.join_next().await {
            let (port, outcome) = joined.map_err(|e| {
                crate::error::PlatformError::GroupFailed(format!("reclaim task panicked: {e}"))
            })?;
            out.insert(port, outcome?);
        }
        Ok(out)
    }
}

async fn reclaim_port(
    platform: Arc<dyn PlatformAdapter>,
    port: u16,
    self_pid: u32,
    r_max: u32,
) -> Result<ReclaimOutcome> {
    for attempt in 0..r_max {
        platform.kill_on_port(port, self_pid).await?;
        let occupants = platform.pids_on_ports(&[port]).await?;
        if occupants.get(&port).map(|pids| pids.is_empty()).unwrap_or(true) {
            return Ok(ReclaimOutcome::Freed);
        }
        if attempt + 1 < r_max {
            tokio::time::sleep(RECLAIM_INTERVAL).await;
        }
    }
    Ok(ReclaimOutcome::StillOccupied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakePlatform;

    #[tokio::test]
    async fn reclaim_succeeds_once_the_port_frees() {
        let fake = Arc::new(FakePlatform::new());
        fake.set_occupied(8000, 999);
        let registry = PortRegistry::with_r_max(fake.clone(), 3);
        let outcome = registry.reclaim(8000, 1).await.unwrap();
        assert_eq!(outcome, ReclaimOutcome::Freed);
    }

    #[tokio::test]
    async fn reclaim_all_covers_every_port() {
        let fake = Arc::new(FakePlatform::new());
        fake.set_occupied(8000, 999);
        fake.set_occupied(8001, 998);
        let registry = PortRegistry::with_r_max(fake, 2);
        let outcomes = registry.reclaim_all(&[8000, 8001], 1).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.values().all(|o| *o == ReclaimOutcome::Freed));
    }
}
