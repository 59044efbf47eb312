//! The public entry point: validates every call, owns exactly one
//! [`Core`], and is the sole boundary that turns internal failures into
//! either a recorded metric or a caller-visible [`ValidationError`]/
//! [`InitError`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::adapter;
use crate::core::{Core, FrameOutcome};
use crate::edge;
use crate::error::{InitError, LibraryFailure, Result, ValidationError};
use crate::frame::{FrameView, FrameViewMut, Plane};
use crate::metrics::MetricsSnapshot;
use crate::observer::{LogLevel, LogSink, NullSink};
use crate::params::{self, StabilizerParams};

/// Owns one [`Core`] and the pixel-level plumbing around it. This is the
/// type hosts actually construct and call.
pub struct Stabilizer {
    core: Core,
    last_error: Option<String>,
    log_sink: Arc<dyn LogSink>,
}

impl Stabilizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Core::new(),
            last_error: None,
            log_sink: Arc::new(NullSink),
        }
    }

    /// Construct with custom feature-detection/optical-flow collaborators,
    /// for hosts that already bind a real computer-vision library.
    #[must_use]
    pub fn with_collaborators(
        detector: Box<dyn crate::features::FeatureDetector>,
        tracker: Box<dyn crate::features::OpticalFlowTracker>,
    ) -> Self {
        Self {
            core: Core::with_collaborators(detector, tracker),
            last_error: None,
            log_sink: Arc::new(NullSink),
        }
    }

    /// Register a host-facing log observer, replacing any previous one.
    /// Forwarded to [`Core`] too, so its own tracing events reach the sink.
    pub fn set_log_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.core.set_log_sink(Arc::clone(&sink));
        self.log_sink = sink;
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics().snapshot()
    }

    #[must_use]
    pub fn state(&self) -> crate::core::CoreState {
        self.core.state()
    }

    /// Validate `width`/`height`, then (re)initialize the stabilizer. Clears
    /// all tracking state even if this is a reinitialize at a new size.
    pub fn initialize(
        &mut self,
        width: u32,
        height: u32,
        params: StabilizerParams,
    ) -> std::result::Result<(), InitError> {
        if width < crate::constants::MIN_DIMENSION
            || height < crate::constants::MIN_DIMENSION
            || width > crate::constants::MAX_WIDTH
            || height > crate::constants::MAX_HEIGHT
        {
            let err = InitError::DimensionsOutOfRange { width, height };
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        self.last_error = None;
        self.core.initialize(width, height, params::validate(params));
        self.log(LogLevel::Debug, &format!("initialized at {width}x{height}"));
        Ok(())
    }

    /// Apply a live parameter update. Always succeeds: out-of-range values
    /// are clamped by [`params::validate`].
    pub fn update_parameters(&mut self, params: StabilizerParams) {
        self.core.update_parameters(params::validate(params));
    }

    /// Reset tracking state without forgetting the current dimensions or
    /// parameters.
    pub fn reset(&mut self) {
        self.core.reset();
    }

    /// Process one host frame in place: validates it, converts to
    /// grayscale, runs the stabilization state machine, then warps the
    /// host's own planes (and crops/rescales, for
    /// [`crate::params::EdgeMode::Crop`]).
    ///
    /// On any internal collaborator panic, the frame passes through
    /// unchanged and the event is recorded in metrics rather than
    /// propagated, matching the "library failures never escape" contract.
    pub fn process_frame(&mut self, frame: &mut FrameViewMut<'_>) -> Result<()> {
        let start = Instant::now();
        let (width, height, format) = (frame.width, frame.height, frame.format);

        {
            let planes: Vec<Plane<'_>> = frame
                .planes
                .iter()
                .map(|p| Plane { data: &*p.data, stride: p.stride })
                .collect();
            let view = FrameView { width, height, format, planes: &planes };
            params::validate_frame(&view)?;
            if view.width != self.core.width() || view.height != self.core.height() {
                return Err(ValidationError::dimensions_out_of_range(
                    view.width,
                    view.height,
                ));
            }
        }

        if !self.core.params().enabled {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            self.core.metrics_mut().record_frame(elapsed_ms);
            return Ok(());
        }

        let gray = {
            let planes: Vec<Plane<'_>> = frame
                .planes
                .iter()
                .map(|p| Plane { data: &*p.data, stride: p.stride })
                .collect();
            let view = FrameView { width, height, format, planes: &planes };
            adapter::to_grayscale(&view)
        };

        let core = &mut self.core;
        let outcome = catch_unwind(AssertUnwindSafe(|| core.process(gray)));

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                self.core.metrics_mut().record_library_failure();
                let failure = LibraryFailure("collaborator panicked".to_string());
                self.log(LogLevel::Warn, &format!("{failure}; frame passed through"));
                self.last_error = Some(failure.to_string());
                return Ok(());
            }
        };

        let FrameOutcome::Warp(residual) = outcome else {
            return Ok(());
        };

        // Snapshot the pre-warp bytes: the warp below overwrites the host's
        // buffers in place, and still needs the original as its source.
        let original_planes: Vec<Vec<u8>> = frame.planes.iter().map(|p| p.data.to_vec()).collect();
        let original_strides: Vec<usize> = frame.planes.iter().map(|p| p.stride).collect();
        let original_refs: Vec<Plane<'_>> = original_planes
            .iter()
            .zip(original_strides.iter())
            .map(|(data, &stride)| Plane { data: data.as_slice(), stride })
            .collect();
        let original = FrameView { width, height, format, planes: &original_refs };

        let (effective, crop_rect) =
            edge::effective_transform(&residual, self.core.params().edge_mode, width, height);

        adapter::apply_back(frame, &original, &effective);

        if let Some(rect) = crop_rect {
            apply_crop(frame, &original, rect);
        }
        Ok(())
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
        }
        self.log_sink.on_log(level, message);
    }
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_crop(frame: &mut FrameViewMut<'_>, warped: &FrameView<'_>, rect: edge::Rect) {
    let rect = rect.clamp_to_bounds(frame.width, frame.height);
    match frame.format {
        crate::frame::PixelFormat::Bgra | crate::frame::PixelFormat::Bgrx => {
            crop_plane(frame, warped, 0, 4, rect);
        }
        crate::frame::PixelFormat::Bgr => {
            crop_plane(frame, warped, 0, 3, rect);
        }
        crate::frame::PixelFormat::Nv12 => {
            crop_plane(frame, warped, 0, 1, rect);
            let chroma_rect = half_rect(rect);
            crop_plane(frame, warped, 1, 2, chroma_rect);
        }
        crate::frame::PixelFormat::I420 => {
            crop_plane(frame, warped, 0, 1, rect);
            let chroma_rect = half_rect(rect);
            crop_plane(frame, warped, 1, 1, chroma_rect);
            crop_plane(frame, warped, 2, 1, chroma_rect);
        }
    }
}

fn half_rect(rect: edge::Rect) -> edge::Rect {
    edge::Rect {
        x: rect.x / 2.0,
        y: rect.y / 2.0,
        w: rect.w / 2.0,
        h: rect.h / 2.0,
    }
}

fn crop_plane(frame: &mut FrameViewMut<'_>, warped: &FrameView<'_>, idx: usize, bpp: usize, rect: edge::Rect) {
    let (dst_w, dst_h) = if idx == 0 {
        (frame.width, frame.height)
    } else {
        (frame.width.div_ceil(2), frame.height.div_ceil(2))
    };
    let src = &warped.planes[idx];
    let dst_stride = frame.planes[idx].stride;
    let resized = edge::crop_resize_plane(src.data, src.stride, bpp, rect, dst_w, dst_h, dst_stride);
    frame.planes[idx].data.copy_from_slice(&resized);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PlaneMut;

    fn bgra_planes(size: u32) -> (Vec<u8>, usize) {
        let stride = (size as usize) * 4;
        (vec![0u8; stride * size as usize], stride)
    }

    #[test]
    fn initialize_rejects_too_small_dimensions() {
        let mut s = Stabilizer::new();
        let err = s
            .initialize(16, 16, StabilizerParams::default())
            .expect_err("should reject");
        assert!(matches!(err, InitError::DimensionsOutOfRange { .. }));
        assert!(s.last_error().is_some());
    }

    #[test]
    fn process_frame_before_initialize_is_a_validation_error_on_size_mismatch() {
        let mut s = Stabilizer::new();
        let (mut data, stride) = bgra_planes(64);
        let mut planes = [PlaneMut { data: &mut data, stride }];
        let mut view = FrameViewMut {
            width: 64,
            height: 64,
            format: crate::frame::PixelFormat::Bgra,
            planes: &mut planes,
        };
        let err = s
            .process_frame(&mut view)
            .expect_err("uninitialized core has 0x0");
        assert!(matches!(err, ValidationError::DimensionsOutOfRange { .. }));
    }

    #[test]
    fn first_frame_after_initialize_passes_through_unchanged() {
        let mut s = Stabilizer::new();
        s.initialize(64, 64, StabilizerParams::default()).expect("init");
        let (mut data, stride) = bgra_planes(64);
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        let before = data.clone();
        let mut planes = [PlaneMut { data: &mut data, stride }];
        let mut view = FrameViewMut {
            width: 64,
            height: 64,
            format: crate::frame::PixelFormat::Bgra,
            planes: &mut planes,
        };
        s.process_frame(&mut view).expect("ok");
        assert_eq!(*view.planes[0].data, before);
    }

    #[test]
    fn disabled_params_still_validate_and_record_metrics() {
        let mut s = Stabilizer::new();
        let params = StabilizerParams {
            enabled: false,
            ..StabilizerParams::default()
        };
        s.initialize(64, 64, params).expect("init");
        let (mut data, stride) = bgra_planes(64);
        let before = data.clone();
        let mut planes = [PlaneMut { data: &mut data, stride }];
        let mut view = FrameViewMut {
            width: 64,
            height: 64,
            format: crate::frame::PixelFormat::Bgra,
            planes: &mut planes,
        };
        assert!(s.process_frame(&mut view).is_ok());
        // stabilization work is skipped, so the buffer is untouched...
        assert_eq!(*view.planes[0].data, before);
        // ...but the frame still counts against metrics.
        assert_eq!(s.metrics().frame_count, 1);
    }

    #[test]
    fn disabled_params_still_reject_bad_dimensions() {
        let mut s = Stabilizer::new();
        let params = StabilizerParams {
            enabled: false,
            ..StabilizerParams::default()
        };
        s.initialize(64, 64, params).expect("init");
        let (mut data, stride) = bgra_planes(32);
        let mut planes = [PlaneMut { data: &mut data, stride }];
        let mut view = FrameViewMut {
            width: 32,
            height: 32,
            format: crate::frame::PixelFormat::Bgra,
            planes: &mut planes,
        };
        let err = s.process_frame(&mut view).expect_err("size mismatch");
        assert!(matches!(err, ValidationError::DimensionsOutOfRange { .. }));
        assert_eq!(s.metrics().frame_count, 0);
    }

    struct CollectingSink(std::sync::Mutex<Vec<String>>);

    impl LogSink for CollectingSink {
        fn on_log(&self, _level: LogLevel, message: &str) {
            self.0.lock().expect("lock").push(message.to_string());
        }
    }

    #[test]
    fn log_sink_receives_both_wrapper_and_core_events() {
        // A real tracing subscriber installed alongside the sink: both are
        // expected to receive every event, and installing one must not
        // change what reaches the sink.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let sink = Arc::new(CollectingSink(std::sync::Mutex::new(Vec::new())));
        let mut s = Stabilizer::new();
        s.set_log_sink(sink.clone());
        s.initialize(64, 64, StabilizerParams::default()).expect("init");

        let mut params = StabilizerParams::default();
        params.smoothing_radius = 5;
        s.update_parameters(params);
        params.min_distance += 1.0;
        s.update_parameters(params);

        let messages = sink.0.lock().expect("lock");
        assert!(messages.iter().any(|m| m.contains("initialized")));
        assert!(messages.iter().any(|m| m.contains("re-detect")));
    }
}
