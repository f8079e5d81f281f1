//! # Progress Events
//!
//! Ordered event stream for a reconciliation run.
//!
//! ## Overview
//!
//! Events are built as owned values at emission time. Every event carries a
//! copy of the run summary, so a consumer never sees a summary change after
//! it received it. Delivery is through an unbounded tokio channel, which
//! keeps the stage loop from blocking on a slow consumer.
//!
//! `log` events are also written to `tracing` at the matching level.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (emitter, mut events) = ProgressEmitter::channel();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//! });
//! coordinator.run(&tenant, SyncOptions::default(), &emitter).await?;
//! ```

use crate::action::SyncAction;
use crate::planner::StageTotals;
use bridge_traits::{Clock, SystemClock};
use core_library::models::RunSummary;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Reconciliation stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStage {
    MissingInDb,
    OrphanInDb,
    MetadataConflicts,
    StatusReconciliation,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::MissingInDb => "missing-in-db",
            SyncStage::OrphanInDb => "orphan-in-db",
            SyncStage::MetadataConflicts => "metadata-conflicts",
            SyncStage::StatusReconciliation => "status-reconciliation",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Start,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub dry_run: bool,
}

/// One message on the progress stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncProgressEvent {
    Start {
        summary: RunSummary,
        totals: StageTotals,
        options: RunOptions,
    },
    Stage {
        stage: SyncStage,
        status: StageStatus,
        processed: usize,
        total: usize,
        summary: RunSummary,
    },
    Action {
        stage: SyncStage,
        index: usize,
        total: usize,
        action: SyncAction,
        summary: RunSummary,
    },
    #[serde(rename_all = "camelCase")]
    Log {
        level: ProgressLogLevel,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<SyncStage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        storage_key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        timestamp: String,
    },
    Complete {
        summary: RunSummary,
        actions: Vec<SyncAction>,
    },
    Error {
        message: String,
    },
}

/// Optional structured context of a `log` event
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub stage: Option<SyncStage>,
    pub storage_key: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl LogContext {
    pub fn stage(stage: SyncStage) -> Self {
        Self {
            stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Sending half of the progress stream
#[derive(Clone)]
pub struct ProgressEmitter {
    sender: Option<mpsc::UnboundedSender<SyncProgressEvent>>,
    clock: Arc<dyn Clock>,
}

impl ProgressEmitter {
    pub fn new(sender: mpsc::UnboundedSender<SyncProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
            clock: Arc::new(SystemClock),
        }
    }

    /// Emitter that drops every event; logs still reach `tracing`.
    pub fn silent() -> Self {
        Self {
            sender: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Emitter plus the receiving end of its stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Use `clock` for `log` timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send an event. A dropped receiver is not an error for the run.
    pub fn emit(&self, event: SyncProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn log(&self, level: ProgressLogLevel, message: impl Into<String>, context: LogContext) {
        let message = message.into();
        let stage = context.stage.map(|s| s.as_str()).unwrap_or_default();
        let key = context.storage_key.as_deref().unwrap_or_default();
        match level {
            ProgressLogLevel::Info | ProgressLogLevel::Success => {
                info!(stage, storage_key = key, "{}", message)
            }
            ProgressLogLevel::Warn => warn!(stage, storage_key = key, "{}", message),
            ProgressLogLevel::Error => error!(stage, storage_key = key, "{}", message),
        }

        self.emit(SyncProgressEvent::Log {
            level,
            message,
            stage: context.stage,
            storage_key: context.storage_key,
            details: context.details,
            timestamp: self.clock.iso_timestamp(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.emit(SyncProgressEvent::Error { message });
    }
}

impl Default for ProgressEmitter {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("connected", &self.sender.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::FixedClock;

    #[test]
    fn test_event_tags() {
        let event = SyncProgressEvent::Stage {
            stage: SyncStage::OrphanInDb,
            status: StageStatus::Start,
            processed: 0,
            total: 2,
            summary: RunSummary::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage");
        assert_eq!(json["stage"], "orphan-in-db");
        assert_eq!(json["status"], "start");

        let start = SyncProgressEvent::Start {
            summary: RunSummary::default(),
            totals: StageTotals::default(),
            options: RunOptions { dry_run: true },
        };
        let json = serde_json::to_value(&start).unwrap();
        assert_eq!(json["options"]["dryRun"], true);
        assert_eq!(json["totals"]["status-reconciliation"], 0);
    }

    #[tokio::test]
    async fn test_log_event_timestamp_and_context() {
        let (emitter, mut rx) = ProgressEmitter::channel();
        let emitter = emitter.with_clock(Arc::new(FixedClock::at_millis(0)));

        emitter.log(
            ProgressLogLevel::Warn,
            "skipped",
            LogContext::stage(SyncStage::MissingInDb).with_key("a.jpg"),
        );

        let event = rx.recv().await.unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["level"], "warn");
        assert_eq!(json["storageKey"], "a.jpg");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_summary_is_a_value_copy() {
        let (emitter, mut rx) = ProgressEmitter::channel();
        let mut summary = RunSummary::default();
        emitter.emit(SyncProgressEvent::Complete {
            summary,
            actions: vec![],
        });
        summary.inserted += 1;

        match rx.recv().await.unwrap() {
            SyncProgressEvent::Complete { summary: received, .. } => {
                assert_eq!(received.inserted, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_silent_emitter_accepts_events() {
        let emitter = ProgressEmitter::silent();
        emitter.error("nobody listening");
    }
}
