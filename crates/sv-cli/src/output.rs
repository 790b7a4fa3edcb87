// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::ValueEnum;
use serde::Serialize;
use sv_supervisor::ServiceStatus;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print `data` as pretty JSON, or run `text_fn` for the human-readable form.
pub fn format_or_json<T: Serialize>(format: OutputFormat, data: &T, text_fn: impl FnOnce()) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        OutputFormat::Text => text_fn(),
    }
    Ok(())
}

pub fn print_status_table(services: &[ServiceStatus]) {
    println!("{:<16} {:<9} {:<6} {:<8} {:<10} DETAIL", "SERVICE", "STATE", "PORT", "PID", "INSTALLED");
    for s in services {
        let pid = s.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        let installed = if s.installed { "yes" } else { "no" };
        let detail = if let Some(peer) = &s.managed_by_peer {
            format!("managed by {peer}")
        } else if let Some(err) = &s.last_error {
            err.lines().next().unwrap_or(err).to_string()
        } else if s.state == sv_core::ServiceState::Running {
            if s.ready_confirmed { "ready".to_string() } else { "starting up".to_string() }
        } else {
            String::new()
        };
        println!(
            "{:<16} {:<9} {:<6} {:<8} {:<10} {}",
            s.display_name, s.state, s.port, pid, installed, detail
        );
    }
}
