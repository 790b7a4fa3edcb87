// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Event Sink: an append-only interface the Supervisor writes to. The
//! UI subscribes over the broadcast channel; everything is also mirrored
//! into the structured log, the way the daemon splits its event bus from
//! its `tracing` output.

use parking_lot::Mutex;
use sv_core::{EventRecord, Level};
use tokio::sync::broadcast;

pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, record: EventRecord);
}

fn log_record(record: &EventRecord) {
    match record {
        EventRecord::LogLine { service, stream, line } => {
            tracing::debug!(service = %service, stream = ?stream, "{line}");
        }
        EventRecord::StateChanged { service, from, to, reason } => match reason {
            Some(reason) => tracing::info!(service = %service, %from, %to, %reason, "state changed"),
            None => tracing::info!(service = %service, %from, %to, "state changed"),
        },
        EventRecord::InstallProgress { service, line } => {
            tracing::info!(service = %service, "install: {line}");
        }
        EventRecord::Notice { level, message } => match level {
            Level::Info => tracing::info!("{message}"),
            Level::Warn => tracing::warn!("{message}"),
            Level::Error => tracing::error!("{message}"),
        },
    }
}

/// Broadcasts every record to subscribers (UI connections) and logs it via
/// `tracing`. Lagging subscribers drop the oldest records rather than
/// blocking the supervisor.
pub struct BroadcastSink {
    tx: broadcast::Sender<EventRecord>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, record: EventRecord) {
        log_record(&record);
        // No subscribers is the common case between UI connections; a send
        // error there is not a supervisor problem.
        let _ = self.tx.send(record);
    }
}

/// Test double that just remembers what it was given, for assertions.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<EventRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, record: EventRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::ServiceId;

    #[test]
    fn recording_sink_collects_every_record() {
        let sink = RecordingSink::new();
        sink.emit(EventRecord::notice(Level::Info, "started up"));
        sink.emit(EventRecord::state_changed(
            ServiceId::new("gateway"),
            sv_core::ServiceState::Stopped,
            sv_core::ServiceState::Starting,
        ));
        assert_eq!(sink.records().len(), 2);
    }
}
