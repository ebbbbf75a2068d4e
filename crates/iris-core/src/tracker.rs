//! Correlation ids and per-request timing/outcome accounting.

use crate::error::EnrichError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Terminal state of one tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    Failed,
    TimedOut,
}

impl From<&EnrichError> for TerminalState {
    fn from(err: &EnrichError) -> Self {
        if err.is_timeout() {
            TerminalState::TimedOut
        } else {
            TerminalState::Failed
        }
    }
}

/// One in-flight request, created when a detection event is accepted.
#[derive(Debug)]
pub struct RequestTrace {
    correlation_id: Uuid,
    image_path: String,
    started: Instant,
}

impl RequestTrace {
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn image_path(&self) -> &str {
        &self.image_path
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Read-only snapshot of the accumulated counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerStats {
    pub attempted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl TrackerStats {
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.timed_out
    }
}

/// Process-wide request accounting. The counters are the only shared
/// mutable state in the pipeline; they observe outcomes and never
/// influence them.
#[derive(Debug, Default)]
pub struct MessageTracker {
    attempted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one detection event: assigns its correlation id and starts
    /// the clock.
    pub fn begin(&self, image_path: &str) -> RequestTrace {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        let trace = RequestTrace {
            correlation_id: Uuid::new_v4(),
            image_path: image_path.to_string(),
            started: Instant::now(),
        };
        info!(
            correlation_id = %trace.correlation_id,
            image_path,
            "enrichment request accepted"
        );
        trace
    }

    /// Records the terminal state and duration of one request.
    pub fn finish(&self, trace: &RequestTrace, state: TerminalState) -> Duration {
        let counter = match state {
            TerminalState::Completed => &self.completed,
            TerminalState::Failed => &self.failed,
            TerminalState::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let elapsed = trace.elapsed();
        info!(
            correlation_id = %trace.correlation_id(),
            image_path = trace.image_path(),
            ?state,
            duration_ms = elapsed.as_millis() as u64,
            "enrichment request finished"
        );
        elapsed
    }

    pub fn snapshot(&self) -> TrackerStats {
        TrackerStats {
            attempted: self.attempted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}
