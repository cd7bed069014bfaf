//! Rolling per-worker counters shipped to the renderer every 250 ms
//! (`spec.md` §3, §4.5 `RENDER_STATS`).

use serde::{Deserialize, Serialize};

use super::shading::{RayKindCounters, WorkResults};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    pub rays_rx: u64,
    pub rays_tx: u64,
    pub bytes_rx: u64,
    pub queue_depth_intersect: u64,
    pub queue_depth_illuminate: u64,
    pub queue_depth_light: u64,
    pub produced: RayKindCounters,
    pub killed: RayKindCounters,
    /// Fraction of this worker's assigned primary rays generated so far,
    /// `0.0..=1.0`.
    pub primary_progress: f32,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one job's output into the running totals.
    pub fn merge_work_results(&mut self, results: &WorkResults) {
        self.produced.intersect += results.produced.intersect;
        self.produced.illuminate += results.produced.illuminate;
        self.produced.light += results.produced.light;
        self.killed.intersect += results.killed.intersect;
        self.killed.illuminate += results.killed.illuminate;
        self.killed.light += results.killed.light;
    }

    pub fn record_rx(&mut self, bytes: usize) {
        self.rays_rx += 1;
        self.bytes_rx += bytes as u64;
    }

    pub fn record_tx(&mut self) {
        self.rays_tx += 1;
    }

    pub fn set_queue_depths(&mut self, intersect: usize, illuminate: usize, light: usize) {
        self.queue_depth_intersect = intersect as u64;
        self.queue_depth_illuminate = illuminate as u64;
        self.queue_depth_light = light as u64;
    }

    pub fn set_primary_progress(&mut self, fraction: f32) {
        self.primary_progress = fraction.clamp(0.0, 1.0);
    }

    /// Whether this worker's queues are growing without any kills in the
    /// current interval — the renderer's `RENDER_PAUSE` trigger
    /// (`spec.md` §5 backpressure).
    pub fn is_growing_without_kills(&self) -> bool {
        let total_killed = self.killed.intersect + self.killed.illuminate + self.killed.light;
        let total_depth = self.queue_depth_intersect + self.queue_depth_illuminate + self.queue_depth_light;
        total_killed == 0 && total_depth > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_produced_and_killed_counts() {
        let mut stats = RenderStats::new();
        let mut results = WorkResults::new(1.0, (0, 0));
        results.produced.intersect = 3;
        results.killed.light = 1;
        stats.merge_work_results(&results);
        assert_eq!(stats.produced.intersect, 3);
        assert_eq!(stats.killed.light, 1);
    }

    #[test]
    fn detects_growth_without_kills() {
        let mut stats = RenderStats::new();
        stats.set_queue_depths(5, 0, 0);
        assert!(stats.is_growing_without_kills());
        stats.killed.intersect = 1;
        assert!(!stats.is_growing_without_kills());
    }

    #[test]
    fn primary_progress_is_clamped() {
        let mut stats = RenderStats::new();
        stats.set_primary_progress(1.5);
        assert_eq!(stats.primary_progress, 1.0);
    }
}
