// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin client for the supervisor's Command API: one Unix domain socket
//! connection per request, newline-delimited JSON in both directions.

use std::path::PathBuf;

use sv_core::ServiceId;
use sv_supervisor::{Request, Response, ServiceStatus};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon not running at {0}")]
    NotRunning(PathBuf),
    #[error("lost connection to daemon: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response from daemon: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("daemon reported an error: {0}")]
    Protocol(String),
    #[error("unexpected response from daemon")]
    Unexpected,
}

impl ClientError {
    pub fn is_not_running(&self) -> bool {
        matches!(self, ClientError::NotRunning(_))
    }
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Fails fast with [`ClientError::NotRunning`] if nothing is listening.
    pub async fn connect(socket_path: PathBuf) -> Result<Self, ClientError> {
        UnixStream::connect(&socket_path).await.map_err(|_| ClientError::NotRunning(socket_path.clone()))?;
        Ok(Self { socket_path })
    }

    async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::NotRunning(self.socket_path.clone()))?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        let mut lines = BufReader::new(reader).lines();
        match lines.next_line().await? {
            Some(reply) => Ok(serde_json::from_str(&reply)?),
            None => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "daemon closed the connection without replying",
            ))),
        }
    }

    async fn send_simple(&self, request: &Request) -> Result<(), ClientError> {
        match self.send(request).await? {
            Response::Ack => Ok(()),
            Response::Error { message } => Err(ClientError::Protocol(message)),
            Response::Status { .. } => Err(ClientError::Unexpected),
        }
    }

    pub async fn install_all(&self) -> Result<(), ClientError> {
        self.send_simple(&Request::InstallAll).await
    }

    pub async fn install_selected(&self, ids: &[ServiceId]) -> Result<(), ClientError> {
        self.send_simple(&Request::Install { ids: ids.to_vec() }).await
    }

    pub async fn start_one(&self, id: &ServiceId) -> Result<(), ClientError> {
        self.send_simple(&Request::Start { id: id.clone() }).await
    }

    pub async fn start_selected(&self, ids: &[ServiceId]) -> Result<(), ClientError> {
        self.send_simple(&Request::StartSelected { ids: ids.to_vec() }).await
    }

    pub async fn start_all(&self) -> Result<(), ClientError> {
        self.send_simple(&Request::StartAll).await
    }

    pub async fn stop_one(&self, id: &ServiceId) -> Result<(), ClientError> {
        self.send_simple(&Request::Stop { id: id.clone() }).await
    }

    pub async fn stop_all(&self) -> Result<(), ClientError> {
        self.send_simple(&Request::StopAll).await
    }

    pub async fn status_all(&self) -> Result<Vec<ServiceStatus>, ClientError> {
        match self.send(&Request::StatusAll).await? {
            Response::Status { services } => Ok(services),
            Response::Error { message } => Err(ClientError::Protocol(message)),
            Response::Ack => Err(ClientError::Unexpected),
        }
    }
}
