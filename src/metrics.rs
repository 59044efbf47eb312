//! Rolling per-instance counters, exposed read-only to the host.
//!
//! A plain counter struct updated in place, plus a cheap-to-copy snapshot
//! type with derived ratios so hosts don't have to divide fields themselves.

use crate::constants::{METRICS_EMA_ALPHA, SLOW_FRAME_MS};

/// Mutable counters updated by [`crate::core::Core`] and
/// [`crate::wrapper::Stabilizer`] as frames are processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    frame_count: u64,
    last_processing_time_ms: f64,
    mean_processing_time_ms: f64,
    slow_frame_count: u64,
    tracking_failure_count: u64,
    forced_redetect_count: u64,
    library_failure_count: u64,
}

impl Metrics {
    /// Record one processed frame's elapsed time, updating the EMA mean and
    /// the slow-frame count.
    pub fn record_frame(&mut self, elapsed_ms: f64) {
        self.frame_count += 1;
        self.last_processing_time_ms = elapsed_ms;
        if self.frame_count == 1 {
            self.mean_processing_time_ms = elapsed_ms;
        } else {
            self.mean_processing_time_ms +=
                METRICS_EMA_ALPHA * (elapsed_ms - self.mean_processing_time_ms);
        }
        if elapsed_ms > SLOW_FRAME_MS {
            self.slow_frame_count += 1;
        }
    }

    pub fn record_tracking_failure(&mut self) {
        self.tracking_failure_count += 1;
    }

    pub fn record_forced_redetect(&mut self) {
        self.forced_redetect_count += 1;
    }

    pub fn record_library_failure(&mut self) {
        self.library_failure_count += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frame_count: self.frame_count,
            last_processing_time_ms: self.last_processing_time_ms,
            mean_processing_time_ms: self.mean_processing_time_ms,
            slow_frame_count: self.slow_frame_count,
            tracking_failure_count: self.tracking_failure_count,
            forced_redetect_count: self.forced_redetect_count,
            library_failure_count: self.library_failure_count,
        }
    }
}

/// An immutable, cheap-to-copy view of [`Metrics`] for hosts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub frame_count: u64,
    pub last_processing_time_ms: f64,
    pub mean_processing_time_ms: f64,
    pub slow_frame_count: u64,
    pub tracking_failure_count: u64,
    pub forced_redetect_count: u64,
    pub library_failure_count: u64,
}

impl MetricsSnapshot {
    /// Fraction of processed frames that exceeded the slow-frame threshold.
    #[must_use]
    pub fn slow_frame_ratio(&self) -> f64 {
        if self.frame_count == 0 {
            0.0
        } else {
            self.slow_frame_count as f64 / self.frame_count as f64
        }
    }

    /// Forced re-detects per frame processed: a proxy for how often tracking
    /// is getting knocked over and recovering.
    #[must_use]
    pub fn recovery_ratio(&self) -> f64 {
        if self.frame_count == 0 {
            0.0
        } else {
            self.forced_redetect_count as f64 / self.frame_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_all_zero() {
        let m = Metrics::default();
        let s = m.snapshot();
        assert_eq!(s.frame_count, 0);
        assert_eq!(s.slow_frame_ratio(), 0.0);
    }

    #[test]
    fn first_frame_sets_mean_exactly() {
        let mut m = Metrics::default();
        m.record_frame(5.0);
        assert_eq!(m.snapshot().mean_processing_time_ms, 5.0);
    }

    #[test]
    fn ema_moves_toward_new_samples() {
        let mut m = Metrics::default();
        m.record_frame(5.0);
        for _ in 0..200 {
            m.record_frame(10.0);
        }
        let mean = m.snapshot().mean_processing_time_ms;
        assert!((mean - 10.0).abs() < 0.1, "mean = {mean}");
    }

    #[test]
    fn slow_frames_are_counted() {
        let mut m = Metrics::default();
        m.record_frame(1.0);
        m.record_frame(20.0);
        m.record_frame(2.0);
        assert_eq!(m.snapshot().slow_frame_count, 1);
    }

    #[test]
    fn failure_and_redetect_counters_increment_independently() {
        let mut m = Metrics::default();
        m.record_tracking_failure();
        m.record_tracking_failure();
        m.record_forced_redetect();
        let s = m.snapshot();
        assert_eq!(s.tracking_failure_count, 2);
        assert_eq!(s.forced_redetect_count, 1);
    }

    #[test]
    fn recovery_ratio_divides_by_frame_count() {
        let mut m = Metrics::default();
        m.record_frame(1.0);
        m.record_frame(1.0);
        m.record_forced_redetect();
        assert!((m.snapshot().recovery_ratio() - 0.5).abs() < 1e-9);
    }
}
