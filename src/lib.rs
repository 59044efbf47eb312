//! Real-time video stabilization: feature tracking, RANSAC motion
//! estimation, parameter-space smoothing, and edge handling, driven frame by
//! frame through a single [`Stabilizer`] instance.
//!
//! Each [`Stabilizer`] is single-threaded and cooperative: every method
//! takes `&mut self` and none of them spawn tasks or hold a lock across a
//! call. A host that wants to process several independent streams runs
//! several instances, one per stream, rather than sharing one behind a
//! mutex.
//!
//! ```no_run
//! use vidstab_core::{Stabilizer, StabilizerParams};
//!
//! let mut stabilizer = Stabilizer::new();
//! stabilizer.initialize(1920, 1080, StabilizerParams::default())?;
//! // stabilizer.process_frame(&mut frame)?; // per captured frame
//! # Ok::<(), vidstab_core::InitError>(())
//! ```

mod adapter;
mod constants;
mod core;
mod edge;
mod error;
mod estimate;
mod features;
mod frame;
mod metrics;
mod observer;
#[cfg(feature = "presets")]
mod preset;
mod params;
mod transform;

pub use core::CoreState;
pub use error::{InitError, Result, ValidationError};
pub use features::{
    FeatureDetector, LucasKanadeTracker, OpticalFlowTracker, Point, ShiTomasiDetector, TrackedPoint,
};
pub use frame::{FrameView, FrameViewMut, GrayFrame, Plane, PixelFormat, PlaneMut};
pub use metrics::MetricsSnapshot;
pub use observer::{LogLevel, LogSink, NullSink};
pub use params::{EdgeMode, StabilizerParams, StabilizerParamsBuilder};
#[cfg(feature = "presets")]
pub use preset::{FilePresetStore, PresetStore};
pub use transform::{Decomposed, Transform};
pub use wrapper::Stabilizer;

mod wrapper;
