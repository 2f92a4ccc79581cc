//! Run event bus: typed telemetry from the extraction machine.
//!
//! A `tokio::sync::broadcast` channel carrying [`RunEvent`] values. The CLI,
//! log sinks, and tests can subscribe independently. When no subscribers
//! exist, events are silently dropped (zero overhead).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event a run emits. Serialized to JSON for machine-readable output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// A run has started for a source.
    RunStarted {
        run_id: String,
        source: String,
        timestamp: String,
    },
    /// An extraction phase has started.
    PhaseStarted { run_id: String, phase: RunPhase },
    /// An extraction phase finished.
    PhaseCompleted {
        run_id: String,
        phase: RunPhase,
        elapsed_ms: u64,
    },
    /// A raw download landed on disk.
    DownloadCaptured {
        run_id: String,
        path: String,
        byte_size: u64,
    },
    /// The run completed; records were upserted.
    RunCompleted {
        run_id: String,
        source: String,
        records_loaded: u64,
        total_ms: u64,
    },
    /// The run failed in the named phase.
    RunFailed {
        run_id: String,
        source: String,
        phase: RunPhase,
        error: String,
    },
}

/// The three ordered phases of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Setup,
    Extract,
    Process,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Extract => write!(f, "extract"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// Broadcast bus for run events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with a bounded buffer. Slow subscribers lag, they do not
    /// block emitters.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event. Dropped silently when nobody is listening.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
