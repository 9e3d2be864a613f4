//! Ambient progress/telemetry layer for batch runs: bounded queue of
//! `on_progress`/`on_error` events plus a cancellation signal. Kept as
//! its own crate, separate from the engine it instruments, so neither
//! the orchestrator nor the CLI needs to know how progress is surfaced.
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod telemetry;

pub use telemetry::{BatchTelemetry, new_correlation_id, run_start, run_success, run_failure, file_success, file_failure};

/// One unit of progress from a batch run, emitted per file or per
/// namespace boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    RunStarted {
        correlation_id: String,
        total_files: usize,
    },
    FileStarted {
        correlation_id: String,
        file: String,
    },
    FileSucceeded {
        correlation_id: String,
        file: String,
    },
    FileFailed {
        correlation_id: String,
        file: String,
        error_kind: String,
        message: String,
    },
    CacheSynced {
        correlation_id: String,
        rows: usize,
    },
    RunFinished {
        correlation_id: String,
        successful: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Bounded event queue between a batch run and whatever is listening to
/// it: producers block at their next suspension point once the queue
/// fills, rather than growing unboundedly.
pub struct EventBus {
    sender: Sender<BatchEvent>,
    receiver: Receiver<BatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    pub fn sender(&self) -> Sender<BatchEvent> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> Receiver<BatchEvent> {
        self.receiver.clone()
    }

    /// Drain every event currently queued, calling `on_progress` for
    /// progress events and `on_error` for failures — the callback pair a
    /// batch runner config names.
    pub fn drain_with(
        &self,
        mut on_progress: impl FnMut(&BatchEvent),
        mut on_error: impl FnMut(&BatchEvent),
    ) {
        while let Ok(event) = self.receiver.try_recv() {
            if matches!(event, BatchEvent::FileFailed { .. }) {
                on_error(&event);
            } else {
                on_progress(&event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A cancellation signal a batch run checks at every suspension point:
/// file I/O, AST parsing, graph-store I/O, inference recursion steps.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_bus_drains_progress_and_error_separately() {
        let bus = EventBus::new(8);
        bus.sender()
            .send(BatchEvent::FileSucceeded {
                correlation_id: "c1".into(),
                file: "a.ts".into(),
            })
            .unwrap();
        bus.sender()
            .send(BatchEvent::FileFailed {
                correlation_id: "c1".into(),
                file: "b.ts".into(),
                error_kind: "ParseError".into(),
                message: "boom".into(),
            })
            .unwrap();

        let mut progress_count = 0;
        let mut error_count = 0;
        bus.drain_with(|_| progress_count += 1, |_| error_count += 1);
        assert_eq!(progress_count, 1);
        assert_eq!(error_count, 1);
    }

    #[test]
    fn cancellation_token_reports_state() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
