// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sv`: a thin command-line client for the supervisor daemon. Every
//! subcommand opens one connection to the Command API socket, sends a
//! single request, and prints the reply.

mod client;
mod output;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client::DaemonClient;
use output::{format_or_json, print_status_table, OutputFormat};
use sv_core::ServiceId;

#[derive(Parser)]
#[command(name = "sv", about = "Control the service supervisor daemon")]
struct Cli {
    /// Output machine-readable JSON instead of a table
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the status of every declared service
    Status,
    /// Run install recipes
    Install {
        /// Service ids to install; installs every service if omitted
        ids: Vec<String>,
    },
    /// Start one or more services
    Start {
        /// Service ids to start; starts every service if omitted
        ids: Vec<String>,
    },
    /// Stop one or more services
    Stop {
        /// Service ids to stop; stops every service if omitted
        ids: Vec<String>,
    },
}

fn ids_of(raw: Vec<String>) -> Vec<ServiceId> {
    raw.into_iter().map(ServiceId::new).collect()
}

async fn connect() -> Result<DaemonClient> {
    let state_dir = sv_supervisor::config::state_dir().map_err(|e| anyhow!("{e}"))?;
    let socket_path = sv_supervisor::config::socket_path(&state_dir);
    DaemonClient::connect(socket_path).await.map_err(|e| {
        if e.is_not_running() {
            anyhow!("supervisor daemon is not running (start it with `svd`)")
        } else {
            anyhow!("{e}")
        }
    })
}

async fn run(cli: Cli) -> Result<()> {
    let client = connect().await?;

    match cli.command {
        Command::Status => {
            let services = client.status_all().await.map_err(|e| anyhow!("{e}"))?;
            format_or_json(cli.format, &services, || print_status_table(&services))?;
        }
        Command::Install { ids } => {
            if ids.is_empty() {
                client.install_all().await.map_err(|e| anyhow!("{e}"))?;
            } else {
                client.install_selected(&ids_of(ids)).await.map_err(|e| anyhow!("{e}"))?;
            }
            format_or_json(cli.format, &serde_json::json!({ "ok": true }), || println!("install complete"))?;
        }
        Command::Start { ids } => {
            if ids.is_empty() {
                client.start_all().await.map_err(|e| anyhow!("{e}"))?;
            } else {
                let ids = ids_of(ids);
                match ids.as_slice() {
                    [one] => client.start_one(one).await.map_err(|e| anyhow!("{e}"))?,
                    many => client.start_selected(many).await.map_err(|e| anyhow!("{e}"))?,
                }
            }
            format_or_json(cli.format, &serde_json::json!({ "ok": true }), || println!("started"))?;
        }
        Command::Stop { ids } => {
            if ids.is_empty() {
                client.stop_all().await.map_err(|e| anyhow!("{e}"))?;
            } else {
                for id in ids_of(ids) {
                    client.stop_one(&id).await.map_err(|e| anyhow!("{e}"))?;
                }
            }
            format_or_json(cli.format, &serde_json::json!({ "ok": true }), || println!("stopped"))?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sv: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
