//! Time-Series Writer
//!
//! Adapts classified readings into time-series points and hands them to a
//! pluggable [`PointSink`]:
//! - `InfluxWriter`: bounded queue drained by a background task that batches
//!   InfluxDB line protocol over HTTP
//! - `MemorySink`: in-process store for tests and dry runs
//!
//! Writes are fire-and-forget. A sink never blocks the pipeline and never
//! reports failure to it; lost points are counted in [`WriteStats`] instead.

pub mod influx;
pub mod line_protocol;
mod memory;

pub use influx::{InfluxWriter, SinkError};
pub use memory::MemorySink;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::EvaluatedPoint;

/// Destination for evaluated points.
///
/// Implementations must be thread-safe (Send + Sync); one handle is shared by
/// every message-handling invocation.
pub trait PointSink: Send + Sync {
    /// Enqueue one point. Must not block and must not fail from the caller's
    /// perspective; undeliverable points are counted as dropped.
    fn write(&self, point: &EvaluatedPoint);

    /// Delivery counters
    fn stats(&self) -> WriteStatsSnapshot;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Lock-free delivery counters shared between a sink handle and its flusher
#[derive(Debug, Default)]
pub struct WriteStats {
    enqueued: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl WriteStats {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self, count: u64) {
        self.written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriteStatsSnapshot {
        WriteStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WriteStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStatsSnapshot {
    /// Points accepted into the sink's queue
    pub enqueued: u64,
    /// Points confirmed persisted
    pub written: u64,
    /// Points lost (queue full, sink closed, or rejected by the backend)
    pub dropped: u64,
}

impl WriteStatsSnapshot {
    /// Points accepted but not yet written or dropped
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.written + self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot_and_pending() {
        let stats = WriteStats::default();
        for _ in 0..5 {
            stats.record_enqueued();
        }
        stats.record_written(3);
        stats.record_dropped(1);

        let snap = stats.snapshot();
        assert_eq!(snap.enqueued, 5);
        assert_eq!(snap.written, 3);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.pending(), 1);
    }
}
