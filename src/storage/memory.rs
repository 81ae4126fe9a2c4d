//! In-memory point sink for tests and dry runs
//!
//! Thread-safe via `Mutex`. Not durable. Keeps the most recent `capacity`
//! points. Can be switched to "unreachable" to exercise the dropped-write path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{PointSink, WriteStats, WriteStatsSnapshot};
use crate::types::EvaluatedPoint;

pub struct MemorySink {
    points: Mutex<VecDeque<EvaluatedPoint>>,
    capacity: usize,
    reachable: AtomicBool,
    stats: WriteStats,
}

impl MemorySink {
    /// Create a sink retaining at most `capacity` points (oldest evicted first)
    pub fn new(capacity: usize) -> Self {
        Self {
            points: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            reachable: AtomicBool::new(true),
            stats: WriteStats::default(),
        }
    }

    /// Simulate the backend going away (`false`) or coming back (`true`)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }

    /// Copy of the retained points, oldest first
    pub fn points(&self) -> Vec<EvaluatedPoint> {
        self.points
            .lock()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.points.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl PointSink for MemorySink {
    fn write(&self, point: &EvaluatedPoint) {
        self.stats.record_enqueued();

        if !self.reachable.load(Ordering::Relaxed) {
            self.stats.record_dropped(1);
            return;
        }

        match self.points.lock() {
            Ok(mut points) => {
                if points.len() >= self.capacity {
                    points.pop_front();
                }
                points.push_back(point.clone());
                self.stats.record_written(1);
            }
            Err(_) => self.stats.record_dropped(1),
        }
    }

    fn stats(&self) -> WriteStatsSnapshot {
        self.stats.snapshot()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
