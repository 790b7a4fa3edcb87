// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by the Platform Adapter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("no suitable runtime found (tried up to Python 3.{0})")]
    RuntimeNotFound(u8),

    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("failed to create process group: {0}")]
    GroupFailed(String),

    #[error("failed to enumerate processes on port {0}")]
    PortScanFailed(u16),

    #[error("health probe failed: {0}")]
    ProbeFailed(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;
