//! The stabilizer state machine: detect, track, estimate, smooth, and decide
//! what (if anything) should be warped into the current frame.
//!
//! [`Core`] works exclusively in grayscale point-and-transform space; it
//! never touches color planes or host frame layouts. The [`crate::wrapper::Stabilizer`]
//! is responsible for converting to/from grayscale and for actually warping
//! pixels, using the [`Transform`] this module hands back.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::constants::*;
use crate::error::TrackingOutcome;
use crate::estimate::{self, estimate_partial_affine};
use crate::features::{FeatureDetector, LucasKanadeTracker, OpticalFlowTracker, Point, ShiTomasiDetector};
use crate::frame::GrayFrame;
use crate::metrics::Metrics;
use crate::observer::{LogLevel, LogSink, NullSink};
use crate::params::StabilizerParams;
use crate::transform::Transform;

/// Lifecycle state, derived from whether a previous grayscale frame exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    /// `initialize` has not yet been called.
    Uninitialized,
    /// Initialized but no previous frame has been processed yet.
    Cold,
    /// A previous frame and feature set exist; frames produce warps.
    Warm,
}

/// What the caller should do with the frame just processed.
#[derive(Debug, Clone, Copy)]
pub enum FrameOutcome {
    /// Return the input frame exactly as given: no warp, no edge handling.
    Passthrough,
    /// Apply this residual affine to the frame, then run edge handling.
    Warp(Transform),
}

/// The stabilization state machine. Exclusively owns `params`, `prev_gray`,
/// `prev_points`, `transform_history`, and `metrics`.
pub struct Core {
    width: u32,
    height: u32,
    initialized: bool,
    params: StabilizerParams,
    prev_gray: Option<GrayFrame>,
    prev_points: Vec<Point>,
    transform_history: VecDeque<Transform>,
    cumulative: Transform,
    consecutive_tracking_failures: u32,
    frames_since_detect: u64,
    frame_index: u64,
    metrics: Metrics,
    detector: Box<dyn FeatureDetector>,
    tracker: Box<dyn OpticalFlowTracker>,
    log_sink: Arc<dyn LogSink>,
}

impl Core {
    /// Construct an uninitialized core using the default hand-rolled
    /// Shi-Tomasi detector and pyramidal Lucas-Kanade tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_collaborators(Box::new(ShiTomasiDetector), Box::new(LucasKanadeTracker))
    }

    /// Construct with custom feature-detection/optical-flow collaborators.
    #[must_use]
    pub fn with_collaborators(
        detector: Box<dyn FeatureDetector>,
        tracker: Box<dyn OpticalFlowTracker>,
    ) -> Self {
        Self {
            width: 0,
            height: 0,
            initialized: false,
            params: StabilizerParams::default(),
            prev_gray: None,
            prev_points: Vec::new(),
            transform_history: VecDeque::new(),
            cumulative: Transform::identity(),
            consecutive_tracking_failures: 0,
            frames_since_detect: 0,
            frame_index: 0,
            metrics: Metrics::default(),
            detector,
            tracker,
            log_sink: Arc::new(NullSink),
        }
    }

    /// Register a host-facing log observer. Forwarded from
    /// [`crate::wrapper::Stabilizer::set_log_sink`] so `Core`'s own tracing
    /// events reach it too.
    pub(crate) fn set_log_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.log_sink = sink;
    }

    fn notify(&self, level: LogLevel, message: &str) {
        self.log_sink.on_log(level, message);
    }

    #[must_use]
    pub fn state(&self) -> CoreState {
        if !self.initialized {
            CoreState::Uninitialized
        } else if self.prev_gray.is_none() {
            CoreState::Cold
        } else {
            CoreState::Warm
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn params(&self) -> &StabilizerParams {
        &self.params
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    #[must_use]
    pub fn consecutive_tracking_failures(&self) -> u32 {
        self.consecutive_tracking_failures
    }

    #[must_use]
    pub fn transform_history_len(&self) -> usize {
        self.transform_history.len()
    }

    #[must_use]
    pub fn transform_history(&self) -> &VecDeque<Transform> {
        &self.transform_history
    }

    /// Reinitialize at new dimensions with the given (already-validated)
    /// parameters. Resets all state.
    pub fn initialize(&mut self, width: u32, height: u32, params: StabilizerParams) {
        self.width = width;
        self.height = height;
        self.params = params;
        self.initialized = true;
        self.reset();
    }

    /// Clear tracking state; leaves `params` and frozen dimensions unchanged.
    pub fn reset(&mut self) {
        self.prev_gray = None;
        self.prev_points.clear();
        self.transform_history.clear();
        self.cumulative = Transform::identity();
        self.consecutive_tracking_failures = 0;
        self.frames_since_detect = 0;
    }

    /// Apply a live parameter update. If detection-affecting fields changed,
    /// invalidate `prev_points` to force a re-detect next frame. If
    /// `smoothing_radius` shrank, truncate the history immediately.
    pub fn update_parameters(&mut self, new_params: StabilizerParams) {
        if self.params.detection_settings_changed(&new_params) {
            self.prev_points.clear();
            let message = "detection settings changed, forcing re-detect next frame";
            tracing::debug!("{message}");
            self.notify(LogLevel::Debug, message);
        }
        while self.transform_history.len() > new_params.smoothing_radius as usize {
            self.transform_history.pop_front();
        }
        self.params = new_params;
    }

    fn detect_features(&self, gray: &GrayFrame) -> Vec<Point> {
        self.detector.detect(gray, &self.params)
    }

    /// Process one grayscale frame, advancing the state machine.
    pub fn process(&mut self, curr_gray: GrayFrame) -> FrameOutcome {
        let start = Instant::now();
        self.frame_index += 1;

        let outcome = match self.prev_gray.take() {
            None => {
                // Cold: first frame since initialize/reset.
                let points = self.detect_features(&curr_gray);
                self.transform_history.push_back(Transform::identity());
                self.cumulative = Transform::identity();
                self.prev_points = points;
                self.prev_gray = Some(curr_gray);
                FrameOutcome::Passthrough
            }
            Some(prev_gray) => self.process_warm(prev_gray, curr_gray),
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let surviving = self.prev_points.len();
        self.metrics.record_frame(elapsed_ms);
        if elapsed_ms > SLOW_FRAME_MS {
            tracing::warn!(
                frame = self.frame_index,
                width = self.width,
                height = self.height,
                surviving_points = surviving,
                elapsed_ms,
                "slow frame"
            );
            self.notify(
                LogLevel::Warn,
                &format!(
                    "slow frame {} ({elapsed_ms:.2}ms, {surviving} surviving points)",
                    self.frame_index
                ),
            );
        }

        outcome
    }

    fn process_warm(&mut self, prev_gray: GrayFrame, curr_gray: GrayFrame) -> FrameOutcome {
        let tracked = self.tracker.track(&prev_gray, &curr_gray, &self.prev_points);

        let mut matched_prev = Vec::new();
        let mut matched_curr = Vec::new();
        for (p, t) in self.prev_points.iter().zip(tracked.iter()) {
            if t.status
                && t.error <= self.params.tracking_error_threshold
                && crate::params::is_valid_point(t.point.0, t.point.1, self.width, self.height)
            {
                matched_prev.push(*p);
                matched_curr.push(t.point);
            }
        }

        if matched_prev.len() < MIN_SURVIVING_POINTS {
            return self.handle_tracking_failure(curr_gray);
        }

        let diag = ((self.width as f64).powi(2) + (self.height as f64).powi(2)).sqrt();
        let threshold = ransac_threshold(&self.params, diag);
        let seed = self.frame_index.wrapping_mul(0x9E3779B97F4A7C15) | 1;

        let Some(result) = estimate_partial_affine(&matched_prev, &matched_curr, threshold, seed)
        else {
            return self.handle_tracking_failure(curr_gray);
        };

        if !result.transform.is_valid(self.params.max_displacement) {
            return self.handle_tracking_failure(curr_gray);
        }

        let inlier_prev: Vec<Point> = result.inliers.iter().map(|&i| matched_prev[i]).collect();
        if estimate::point_spread(&inlier_prev) < self.params.min_point_spread {
            return self.handle_tracking_failure(curr_gray);
        }

        let limit_x = self.params.max_correction / 100.0 * f64::from(self.width);
        let limit_y = self.params.max_correction / 100.0 * f64::from(self.height);
        let d = result.transform.decompose();
        if d.tx.abs() > limit_x || d.ty.abs() > limit_y {
            return self.handle_tracking_failure(curr_gray);
        }

        self.consecutive_tracking_failures = 0;
        tracing::trace!(frame = self.frame_index, outcome = ?TrackingOutcome::Tracked, inliers = result.inliers.len(), "tracking attempt succeeded");
        self.notify(
            LogLevel::Trace,
            &format!(
                "frame {} tracking succeeded ({} inliers)",
                self.frame_index,
                result.inliers.len()
            ),
        );

        let Some(frame_transform) = result.transform.invert() else {
            return self.handle_tracking_failure(curr_gray);
        };
        let frame_transform = frame_transform.clamp_translation(limit_x, limit_y);

        self.cumulative = self.cumulative.compose(&frame_transform);
        self.push_history(self.cumulative);

        let smoothed = self.smoothed_transform();
        let mut residual = Transform::subtract(&self.cumulative, &smoothed);

        let rd = residual.decompose();
        if rd.tx.abs() > limit_x || rd.ty.abs() > limit_y {
            residual = residual.clamp_translation(limit_x, limit_y);
        }

        let residual = self.apply_dead_zone(residual);

        self.frames_since_detect += 1;
        let refresh_needed = result.inliers.len() < (self.params.feature_count as usize / 3).max(50)
            || self.frames_since_detect > u64::from(self.params.feature_count) / 10;

        if refresh_needed {
            // Re-detect on curr_gray; prev_gray MUST become curr_gray before
            // prev_points are replaced, or the next frame's pyramid would
            // mismatch the points it carries forward.
            let new_points = self.detect_features(&curr_gray);
            self.prev_gray = Some(curr_gray);
            self.prev_points = new_points;
            self.frames_since_detect = 0;
        } else {
            self.prev_gray = Some(curr_gray);
            self.prev_points = matched_curr;
        }

        FrameOutcome::Warp(residual)
    }

    fn handle_tracking_failure(&mut self, curr_gray: GrayFrame) -> FrameOutcome {
        let outcome = TrackingOutcome::Failed;
        self.consecutive_tracking_failures += 1;
        self.metrics.record_tracking_failure();
        tracing::debug!(frame = self.frame_index, ?outcome, "tracking attempt failed");
        self.notify(
            LogLevel::Debug,
            &format!("frame {} tracking attempt failed", self.frame_index),
        );

        if self.consecutive_tracking_failures >= MAX_CONSECUTIVE_FAILURES {
            tracing::warn!(
                frame = self.frame_index,
                "forced re-detect after consecutive tracking failures"
            );
            self.notify(
                LogLevel::Warn,
                &format!(
                    "frame {} forced re-detect after consecutive tracking failures",
                    self.frame_index
                ),
            );
            let points = self.detect_features(&curr_gray);
            self.push_history(Transform::identity());
            self.cumulative = self
                .transform_history
                .back()
                .copied()
                .unwrap_or_else(Transform::identity);
            self.prev_gray = Some(curr_gray);
            self.prev_points = points;
            self.consecutive_tracking_failures = 0;
            self.frames_since_detect = 0;
            self.metrics.record_forced_redetect();
        } else {
            self.prev_gray = Some(curr_gray);
            // prev_points are left as-is: the tracker will retry against them
            // next frame, matching the source's "hold and retry" behavior.
        }

        FrameOutcome::Passthrough
    }

    fn push_history(&mut self, t: Transform) {
        if self.transform_history.len() >= self.params.smoothing_radius as usize {
            self.transform_history.pop_front();
        }
        self.transform_history.push_back(t);
    }

    /// Gaussian-weighted average of the history, centered on the most recent
    /// entry (sigma = smoothing_radius / 3).
    fn smoothed_transform(&self) -> Transform {
        let n = self.transform_history.len();
        if n == 0 {
            return Transform::identity();
        }
        let sigma = (f64::from(self.params.smoothing_radius) / 3.0).max(1e-6);
        let transforms: Vec<Transform> = self.transform_history.iter().copied().collect();
        let weights: Vec<f64> = (0..n)
            .map(|i| {
                let distance_from_newest = (n - 1 - i) as f64;
                (-(distance_from_newest * distance_from_newest) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        Transform::weighted_mean(&transforms, &weights)
    }

    fn apply_dead_zone(&self, residual: Transform) -> Transform {
        let d = residual.decompose();
        let translation_mag = (d.tx * d.tx + d.ty * d.ty).sqrt();
        if translation_mag < self.params.frame_motion_threshold
            && d.theta.abs() < DEAD_ZONE_ROTATION_RAD
            && (d.scale - 1.0).abs() < DEAD_ZONE_SCALE_DEV
        {
            Transform::identity()
        } else {
            residual
        }
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpolate the RANSAC inlier threshold across `[ransac_threshold_min,
/// ransac_threshold_max]` proportional to the frame diagonal, using a
/// 1920x1080 diagonal as the reference scale.
fn ransac_threshold(params: &StabilizerParams, diag: f64) -> f64 {
    const REFERENCE_DIAG: f64 = 2203.07; // sqrt(1920^2 + 1080^2)
    let t = params.ransac_threshold_min
        + (params.ransac_threshold_max - params.ransac_threshold_min) * (diag / REFERENCE_DIAG);
    t.clamp(params.ransac_threshold_min, params.ransac_threshold_max)
}
