// src/pipeline/metrics.rs
//
// Orchestrator observability. Counters for every subsystem, reported
// periodically by the status thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub frames_ingested: Arc<AtomicU64>,
    pub duplicate_frames: Arc<AtomicU64>,
    pub frames_analyzed: Arc<AtomicU64>,
    pub frames_logged: Arc<AtomicU64>,
    pub takeoffs_detected: Arc<AtomicU64>,
    pub landings_detected: Arc<AtomicU64>,
    pub forced_landings: Arc<AtomicU64>,
    pub triggers_fired: Arc<AtomicU64>,
    pub triggers_refused: Arc<AtomicU64>,
    pub saves_committed: Arc<AtomicU64>,
    pub saves_discarded: Arc<AtomicU64>,
    pub broadcast_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_ingested: Arc::new(AtomicU64::new(0)),
            duplicate_frames: Arc::new(AtomicU64::new(0)),
            frames_analyzed: Arc::new(AtomicU64::new(0)),
            frames_logged: Arc::new(AtomicU64::new(0)),
            takeoffs_detected: Arc::new(AtomicU64::new(0)),
            landings_detected: Arc::new(AtomicU64::new(0)),
            forced_landings: Arc::new(AtomicU64::new(0)),
            triggers_fired: Arc::new(AtomicU64::new(0)),
            triggers_refused: Arc::new(AtomicU64::new(0)),
            saves_committed: Arc::new(AtomicU64::new(0)),
            saves_discarded: Arc::new(AtomicU64::new(0)),
            broadcast_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingest_fps(&self) -> f64 {
        let frames = self.frames_ingested.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames_ingested: self.frames_ingested.load(Ordering::Relaxed),
            duplicate_frames: self.duplicate_frames.load(Ordering::Relaxed),
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            frames_logged: self.frames_logged.load(Ordering::Relaxed),
            ingest_fps: self.ingest_fps(),
            takeoffs_detected: self.takeoffs_detected.load(Ordering::Relaxed),
            landings_detected: self.landings_detected.load(Ordering::Relaxed),
            forced_landings: self.forced_landings.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            triggers_refused: self.triggers_refused.load(Ordering::Relaxed),
            saves_committed: self.saves_committed.load(Ordering::Relaxed),
            saves_discarded: self.saves_discarded.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_ingested: u64,
    pub duplicate_frames: u64,
    pub frames_analyzed: u64,
    pub frames_logged: u64,
    pub ingest_fps: f64,
    pub takeoffs_detected: u64,
    pub landings_detected: u64,
    pub forced_landings: u64,
    pub triggers_fired: u64,
    pub triggers_refused: u64,
    pub saves_committed: u64,
    pub saves_discarded: u64,
    pub broadcast_failures: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increment() {
        let m = PipelineMetrics::new();
        m.inc(&m.frames_ingested);
        m.inc(&m.frames_ingested);
        m.inc(&m.triggers_fired);
        let s = m.summary();
        assert_eq!(s.frames_ingested, 2);
        assert_eq!(s.triggers_fired, 1);
        assert_eq!(s.saves_committed, 0);
    }
}
