// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Command API: a Unix domain socket accepting one newline-delimited
//! JSON [`Request`](crate::protocol::Request) per line and replying with one
//! JSON [`Response`](crate::protocol::Response) per line.

use crate::protocol::{Request, Response};
use crate::supervisor::Supervisor;
use std::path::Path;
use std::sync::Arc;
use sv_core::{Result, ServiceId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

pub async fn serve(supervisor: Arc<Supervisor>, socket_path: &Path, cancel: CancellationToken) -> std::io::Result<()> {
    if socket_path.exists() {
        tokio::fs::remove_file(socket_path).await.ok();
    }
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "command socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(supervisor, stream).await {
                        tracing::warn!(error = %e, "command connection ended with an error");
                    }
                });
            }
            _ = cancel.cancelled() => {
                let _ = tokio::fs::remove_file(socket_path).await;
                return Ok(());
            }
        }
    }
}

async fn handle_connection(supervisor: Arc<Supervisor>, stream: UnixStream) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&supervisor, request).await,
            Err(e) => Response::Error { message: format!("malformed request: {e}") },
        };
        let mut encoded = serde_json::to_string(&response)
            .unwrap_or_else(|_| "{\"result\":\"error\",\"message\":\"failed to encode response\"}".to_string());
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn dispatch(supervisor: &Arc<Supervisor>, request: Request) -> Response {
    match request {
        Request::Install { ids } => first_error_or_ack(supervisor.install_selected(&ids).await),
        Request::InstallAll => first_error_or_ack(supervisor.install_all().await),
        Request::Start { id } => Response::from_result(supervisor.start_one(&id).await, |_| Response::Ack),
        Request::StartSelected { ids } => first_error_or_ack(supervisor.start_selected(&ids).await),
        Request::StartAll => first_error_or_ack(supervisor.start_all().await),
        Request::Stop { id } => Response::from_result(supervisor.stop_one(&id).await, |_| Response::Ack),
        Request::StopAll => first_error_or_ack(supervisor.stop_all().await),
        Request::StatusAll => Response::Status { services: supervisor.status_all() },
    }
}

fn first_error_or_ack(results: Vec<(ServiceId, Result<()>)>) -> Response {
    for (id, result) in results {
        if let Err(e) = result {
            return Response::Error { message: format!("{id}: {e}") };
        }
    }
    Response::Ack
}
