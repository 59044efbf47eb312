//! Error types for stabilizer operations.
//!
//! Only [`ValidationError`] and [`InitError`] are part of the public surface;
//! tracking and library failures are handled internally by
//! [`crate::core::Core`] and never escape [`crate::wrapper::Stabilizer`].

use thiserror::Error;

/// Errors returned by frame, parameter, or transform validation.
///
/// The caller's state is left unchanged whenever this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required plane pointer was null for the frame's declared format.
    #[error("missing required plane for format {format:?}")]
    MissingPlane { format: crate::frame::PixelFormat },

    /// Frame dimensions fall outside `[32, 7680] x [32, 4320]`.
    #[error("frame dimensions {width}x{height} out of range")]
    DimensionsOutOfRange { width: u32, height: u32 },

    /// The frame's pixel format is not one of the five supported formats.
    #[error("unsupported pixel format")]
    UnsupportedFormat,

    /// A plane's stride is smaller than the row-bytes required by its format and width.
    #[error("stride {stride} too small for plane {plane} (needs at least {required})")]
    InvalidStride {
        plane: usize,
        stride: usize,
        required: usize,
    },

    /// `width * height * bytes_per_pixel` overflowed.
    #[error("arithmetic overflow computing frame byte size")]
    SizeOverflow,
}

/// Errors returned by [`crate::wrapper::Stabilizer::initialize`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The requested dimensions are outside `[32, 7680] x [32, 4320]`.
    #[error("cannot initialize at {width}x{height}: out of range")]
    DimensionsOutOfRange { width: u32, height: u32 },
}

/// Crate-level result alias for validation paths.
pub type Result<T> = std::result::Result<T, ValidationError>;

impl ValidationError {
    pub(crate) fn missing_plane(format: crate::frame::PixelFormat) -> Self {
        Self::MissingPlane { format }
    }

    pub(crate) fn dimensions_out_of_range(width: u32, height: u32) -> Self {
        Self::DimensionsOutOfRange { width, height }
    }

    pub(crate) fn invalid_stride(plane: usize, stride: usize, required: usize) -> Self {
        Self::InvalidStride {
            plane,
            stride,
            required,
        }
    }
}

/// Internal, crate-private outcome of a single frame's tracking/estimation
/// attempt. Never surfaced to callers: the [`crate::core::Core`]
/// state machine consumes this itself and turns a failure into a recovery
/// (identity warp plus re-detect), not an error returned up the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackingOutcome {
    Tracked,
    Failed,
}

/// Internal signal that a collaborator (feature detector / optical flow
/// tracker) raised something the [`crate::wrapper::Stabilizer`] should record
/// as `LibraryFailure` and pass the frame through unchanged.
#[derive(Debug, Clone)]
pub(crate) struct LibraryFailure(pub String);

impl std::fmt::Display for LibraryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "library failure: {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    #[test]
    fn display_messages_are_stable() {
        let err = ValidationError::dimensions_out_of_range(16, 16);
        assert_eq!(err.to_string(), "frame dimensions 16x16 out of range");

        let err = ValidationError::missing_plane(PixelFormat::Nv12);
        assert!(err.to_string().contains("Nv12"));
    }

    #[test]
    fn init_error_carries_dimensions() {
        let err = InitError::DimensionsOutOfRange {
            width: 10,
            height: 10,
        };
        assert!(err.to_string().contains("10x10"));
    }
}
