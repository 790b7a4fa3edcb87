// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Health Prober: a bounded-latency readiness check, either an HTTP GET
//! against a declared health path or a bare TCP connect.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

/// One second, per spec: every probe attempt (HTTP or TCP) must resolve
/// within this budget.
pub const PROBE_DEADLINE: Duration = Duration::from_secs(1);

#[async_trait]
pub trait HealthProber: Send + Sync + 'static {
    /// `health_url` is `Some(url)` for services with a declared health
    /// path; `None` means readiness is "TCP connect succeeds" against
    /// `fallback_addr`.
    async fn probe(&self, health_url: Option<&str>, fallback_addr: SocketAddr) -> bool;
}

pub struct SystemProber {
    client: reqwest::Client,
}

impl Default for SystemProber {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PROBE_DEADLINE)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl HealthProber for SystemProber {
    async fn probe(&self, health_url: Option<&str>, fallback_addr: SocketAddr) -> bool {
        match health_url {
            Some(url) => match self.client.get(url).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            },
            None => {
                tokio::time::timeout(PROBE_DEADLINE, tokio::net::TcpStream::connect(fallback_addr))
                    .await
                    .map(|res| res.is_ok())
                    .unwrap_or(false)
            }
        }
    }
}

/// Test double: a shared flag the test flips to simulate the service
/// becoming ready.
#[derive(Default)]
pub struct FakeProber {
    ready: std::sync::atomic::AtomicBool,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProber for FakeProber {
    async fn probe(&self, _health_url: Option<&str>, _fallback_addr: SocketAddr) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_prober_reflects_the_flag() {
        let prober = FakeProber::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert!(!prober.probe(None, addr).await);
        prober.set_ready(true);
        assert!(prober.probe(None, addr).await);
    }
}
