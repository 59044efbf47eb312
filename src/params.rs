//! Stabilizer parameters: the tunable struct plus its
//! builder and infallible validator.
//!
//! The validator never fails: it repairs in place and always returns a
//! usable parameter set. A caller that wants to know what was clamped can
//! diff the input against the output.

use crate::constants::*;

/// Edge-handling strategy after the stabilization warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "presets", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgeMode {
    /// Return the warped frame as-is; black borders may show.
    #[default]
    Padding,
    /// Crop to the largest inscribed rectangle and rescale to original size.
    Crop,
    /// Pre-scale so the warped content exactly fills the frame.
    Scale,
}

/// Tunable parameters governing one [`crate::core::Core`] instance.
///
/// All fields have defaults (see [`StabilizerParams::default`]); every
/// assignment path (builder, live update) runs through [`validate`] before
/// being stored.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "presets", derive(serde::Serialize, serde::Deserialize))]
pub struct StabilizerParams {
    pub enabled: bool,
    pub smoothing_radius: u32,
    pub max_correction: f64,
    pub feature_count: u32,
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: u32,
    pub use_harris: bool,
    pub harris_k: f64,
    pub tracking_error_threshold: f64,
    pub ransac_threshold_min: f64,
    pub ransac_threshold_max: f64,
    pub min_point_spread: f64,
    pub max_displacement: f64,
    pub edge_mode: EdgeMode,
    pub frame_motion_threshold: f64,
}

impl Default for StabilizerParams {
    fn default() -> Self {
        Self {
            enabled: true,
            smoothing_radius: DEFAULT_SMOOTHING_RADIUS,
            max_correction: DEFAULT_MAX_CORRECTION,
            feature_count: DEFAULT_FEATURE_COUNT,
            quality_level: DEFAULT_QUALITY_LEVEL,
            min_distance: DEFAULT_MIN_DISTANCE,
            block_size: DEFAULT_BLOCK_SIZE,
            use_harris: DEFAULT_USE_HARRIS,
            harris_k: DEFAULT_HARRIS_K,
            tracking_error_threshold: DEFAULT_TRACKING_ERROR_THRESHOLD,
            ransac_threshold_min: DEFAULT_RANSAC_THRESHOLD_MIN,
            ransac_threshold_max: DEFAULT_RANSAC_THRESHOLD_MAX,
            min_point_spread: DEFAULT_MIN_POINT_SPREAD,
            max_displacement: DEFAULT_MAX_DISPLACEMENT,
            edge_mode: EdgeMode::Padding,
            frame_motion_threshold: DEFAULT_FRAME_MOTION_THRESHOLD,
        }
    }
}

impl StabilizerParams {
    /// Start building a parameter set from defaults.
    #[must_use]
    pub fn builder() -> StabilizerParamsBuilder {
        StabilizerParamsBuilder::default()
    }

    /// Tuned for heavily shaky handheld footage: tighter smoothing window,
    /// smaller allowed correction so heavy shake doesn't blow the correction
    /// budget on a single frame.
    #[must_use]
    pub fn handheld() -> Self {
        validate(Self {
            smoothing_radius: 15,
            max_correction: 20.0,
            frame_motion_threshold: 0.15,
            ..Self::default()
        })
    }

    /// Tuned for footage that is already mostly stable (gimbal, tripod):
    /// wider smoothing window, looser correction budget since large residuals
    /// are rare and real when they occur.
    #[must_use]
    pub fn gimbal() -> Self {
        validate(Self {
            smoothing_radius: 60,
            max_correction: 50.0,
            frame_motion_threshold: 0.4,
            ..Self::default()
        })
    }

    /// Whether the detection-affecting fields differ meaningfully from
    /// `other`: a change here invalidates
    /// `prev_points` and forces a re-detect.
    #[must_use]
    pub fn detection_settings_changed(&self, other: &Self) -> bool {
        self.feature_count != other.feature_count
            || (self.quality_level - other.quality_level).abs() > f64::EPSILON
            || (self.min_distance - other.min_distance).abs() > f64::EPSILON
            || self.block_size != other.block_size
            || self.use_harris != other.use_harris
            || (self.harris_k - other.harris_k).abs() > f64::EPSILON
    }
}

/// Builder for [`StabilizerParams`], following the fluent `#[must_use]`
/// pattern used throughout this lineage for configuration structs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StabilizerParamsBuilder {
    params: StabilizerParams,
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        #[must_use]
        pub fn $name(mut self, value: $ty) -> Self {
            self.params.$name = value;
            self
        }
    };
}

impl StabilizerParamsBuilder {
    setter!(enabled, bool);
    setter!(smoothing_radius, u32);
    setter!(max_correction, f64);
    setter!(feature_count, u32);
    setter!(quality_level, f64);
    setter!(min_distance, f64);
    setter!(block_size, u32);
    setter!(use_harris, bool);
    setter!(harris_k, f64);
    setter!(tracking_error_threshold, f64);
    setter!(ransac_threshold_min, f64);
    setter!(ransac_threshold_max, f64);
    setter!(min_point_spread, f64);
    setter!(max_displacement, f64);
    setter!(edge_mode, EdgeMode);
    setter!(frame_motion_threshold, f64);

    /// Build and validate the final parameter set. Always succeeds: any
    /// out-of-range value set via a setter is clamped here.
    #[must_use]
    pub fn build(self) -> StabilizerParams {
        validate(self.params)
    }
}

fn clamp_finite(value: f64, default: f64, lo: f64, hi: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        default
    }
}

fn nearest_odd_in_range(value: u32, lo: u32, hi: u32) -> u32 {
    let clamped = value.clamp(lo, hi);
    if clamped % 2 == 0 {
        // Prefer rounding up, then down, staying inside the range.
        if clamped + 1 <= hi {
            clamped + 1
        } else {
            clamped.saturating_sub(1).max(lo)
        }
    } else {
        clamped
    }
}

/// Clamp/repair a parameter struct. Never fails.
#[must_use]
pub fn validate(p: StabilizerParams) -> StabilizerParams {
    let (sr_lo, sr_hi) = SMOOTHING_RADIUS_RANGE;
    let (mc_lo, mc_hi) = MAX_CORRECTION_RANGE;
    let (fc_lo, fc_hi) = FEATURE_COUNT_RANGE;
    let (ql_lo, ql_hi) = QUALITY_LEVEL_RANGE;
    let (md_lo, md_hi) = MIN_DISTANCE_RANGE;
    let (bs_lo, bs_hi) = BLOCK_SIZE_RANGE;
    let (hk_lo, hk_hi) = HARRIS_K_RANGE;

    let smoothing_radius = p.smoothing_radius.clamp(sr_lo, sr_hi);
    let max_correction = clamp_finite(p.max_correction, DEFAULT_MAX_CORRECTION, mc_lo, mc_hi);
    let feature_count = p.feature_count.clamp(fc_lo, fc_hi);
    let quality_level = clamp_finite(p.quality_level, DEFAULT_QUALITY_LEVEL, ql_lo, ql_hi);
    let min_distance = clamp_finite(p.min_distance, DEFAULT_MIN_DISTANCE, md_lo, md_hi);
    let block_size = nearest_odd_in_range(p.block_size, bs_lo, bs_hi);
    let harris_k = clamp_finite(p.harris_k, DEFAULT_HARRIS_K, hk_lo, hk_hi);

    let tracking_error_threshold = if p.tracking_error_threshold.is_finite() {
        p.tracking_error_threshold.max(0.0)
    } else {
        DEFAULT_TRACKING_ERROR_THRESHOLD
    };

    let mut ransac_min = if p.ransac_threshold_min.is_finite() {
        p.ransac_threshold_min
    } else {
        DEFAULT_RANSAC_THRESHOLD_MIN
    };
    let mut ransac_max = if p.ransac_threshold_max.is_finite() {
        p.ransac_threshold_max
    } else {
        DEFAULT_RANSAC_THRESHOLD_MAX
    };
    if ransac_min > ransac_max {
        std::mem::swap(&mut ransac_min, &mut ransac_max);
    }

    let min_point_spread = if p.min_point_spread.is_finite() {
        p.min_point_spread.max(0.0)
    } else {
        DEFAULT_MIN_POINT_SPREAD
    };
    let max_displacement = if p.max_displacement.is_finite() {
        p.max_displacement.max(0.0)
    } else {
        DEFAULT_MAX_DISPLACEMENT
    };
    let frame_motion_threshold = if p.frame_motion_threshold.is_finite() {
        p.frame_motion_threshold.max(0.0)
    } else {
        DEFAULT_FRAME_MOTION_THRESHOLD
    };

    StabilizerParams {
        enabled: p.enabled,
        smoothing_radius,
        max_correction,
        feature_count,
        quality_level,
        min_distance,
        block_size,
        use_harris: p.use_harris,
        harris_k,
        tracking_error_threshold,
        ransac_threshold_min: ransac_min,
        ransac_threshold_max: ransac_max,
        min_point_spread,
        max_displacement,
        edge_mode: p.edge_mode,
        frame_motion_threshold,
    }
}

/// Feature-point sanity: finite, `0 <= x < w`, `0 <= y < h`.
#[must_use]
pub fn is_valid_point(x: f64, y: f64, width: u32, height: u32) -> bool {
    x.is_finite() && y.is_finite() && x >= 0.0 && x < f64::from(width) && y >= 0.0 && y < f64::from(height)
}

/// Transform sanity: rejects non-finite entries, scales outside `[0.5, 1.5]`,
/// and translations exceeding `max_displacement`.
#[must_use]
pub fn validate_transform(m: &crate::transform::Transform, max_displacement: f64) -> bool {
    m.is_valid(max_displacement)
}

/// Validate a host frame's shape and plane layout against its declared
/// format before any conversion is attempted.
///
/// Rejects: out-of-range dimensions, an unsupported format, a plane whose
/// stride is smaller than the row-bytes the format and width require, and
/// arithmetic overflow computing `width * height * bytes_per_pixel`.
pub fn validate_frame(frame: &crate::frame::FrameView<'_>) -> crate::error::Result<()> {
    use crate::error::ValidationError;

    if frame.width < MIN_DIMENSION
        || frame.height < MIN_DIMENSION
        || frame.width > MAX_WIDTH
        || frame.height > MAX_HEIGHT
    {
        return Err(ValidationError::dimensions_out_of_range(
            frame.width,
            frame.height,
        ));
    }

    let expected_planes = frame.format.plane_count();
    if frame.planes.len() < expected_planes {
        return Err(ValidationError::missing_plane(frame.format));
    }

    let width = frame.width as usize;
    let height = frame.height as usize;

    if let Some(bpp) = frame.format.packed_bytes_per_pixel() {
        let row_bytes = width
            .checked_mul(bpp)
            .ok_or(ValidationError::SizeOverflow)?;
        row_bytes
            .checked_mul(height)
            .ok_or(ValidationError::SizeOverflow)?;

        let plane = &frame.planes[0];
        if plane.data.is_empty() {
            return Err(ValidationError::missing_plane(frame.format));
        }
        if plane.stride < row_bytes {
            return Err(ValidationError::invalid_stride(0, plane.stride, row_bytes));
        }
    } else {
        // NV12/I420: plane 0 is full-resolution luma, remaining planes are
        // chroma at half resolution (interleaved for NV12, separate for I420).
        let luma = &frame.planes[0];
        if luma.data.is_empty() {
            return Err(ValidationError::missing_plane(frame.format));
        }
        if luma.stride < width {
            return Err(ValidationError::invalid_stride(0, luma.stride, width));
        }

        let chroma_width = width.div_ceil(2);
        for (idx, plane) in frame.planes.iter().enumerate().skip(1) {
            if plane.data.is_empty() {
                return Err(ValidationError::missing_plane(frame.format));
            }
            let required = if matches!(frame.format, crate::frame::PixelFormat::Nv12) {
                chroma_width * 2
            } else {
                chroma_width
            };
            if plane.stride < required {
                return Err(ValidationError::invalid_stride(idx, plane.stride, required));
            }
        }
    }

    Ok(())
}
