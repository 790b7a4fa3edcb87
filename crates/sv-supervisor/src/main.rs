// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `svd`: the supervisor daemon binary. Wires up logging, resolves the
//! state directory, builds the service registry and the Supervisor, runs
//! the startup sequence, serves the Command API until a shutdown signal
//! arrives, then runs the shutdown sequence.

use std::path::PathBuf;
use std::sync::Arc;
use sv_core::registry::builtin;
use sv_core::ServiceRegistry;
use sv_supervisor::event_sink::BroadcastSink;
use sv_supervisor::{config, lifecycle, server, Supervisor};
use sv_platform::{SystemPlatform, SystemProber};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_logging(state_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(state_dir.join("logs"), "svd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    guard
}

/// Root directory the service catalog's working directories are anchored
/// under, e.g. the installed location of the desktop app this supervises.
fn root_dir() -> PathBuf {
    std::env::var("SV_ROOT_DIR").map(PathBuf::from).unwrap_or_else(|_| {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    })
}

#[tokio::main]
async fn main() {
    let state_dir = match config::state_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("svd: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::create_dir_all(&state_dir) {
        eprintln!("svd: failed to create state directory {}: {e}", state_dir.display());
        std::process::exit(1);
    }

    let _log_guard = init_logging(&state_dir);

    let registry = match ServiceRegistry::new(builtin(root_dir())) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("invalid service registry: {e}");
            std::process::exit(1);
        }
    };

    let platform = Arc::new(SystemPlatform::default());
    let prober = Arc::new(SystemProber::default());
    let sink = Arc::new(BroadcastSink::new(256));
    let supervisor = Arc::new(Supervisor::new(registry, platform, prober, sink, &state_dir));

    let cancel = CancellationToken::new();
    let handles = lifecycle::startup::run(&supervisor, cancel.child_token()).await;

    let socket_path = config::socket_path(&state_dir);
    let server_cancel = cancel.child_token();
    let server_supervisor = supervisor.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server::serve(server_supervisor, &socket_path, server_cancel).await {
            tracing::error!(error = %e, "command server exited with an error");
        }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received");
    cancel.cancel();
    let _ = server_task.await;

    lifecycle::shutdown::run(&supervisor, handles).await;
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler, falling back to ctrl_c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGINT handler, falling back to ctrl_c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = terminate.recv() => {}
        _ = interrupt.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
