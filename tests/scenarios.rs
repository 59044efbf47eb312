//! End-to-end scenarios exercising [`vidstab_core::Stabilizer`] through its
//! public API only: a host feeding a real sequence of frames.

use vidstab_core::{EdgeMode, FrameViewMut, InitError, PixelFormat, PlaneMut, Stabilizer, StabilizerParams, ValidationError};

fn bgra_square(size: u32, at: (u32, u32), square_size: u32) -> Vec<u8> {
    let mut data = vec![0u8; (size as usize) * (size as usize) * 4];
    for y in at.1..(at.1 + square_size).min(size) {
        for x in at.0..(at.0 + square_size).min(size) {
            let idx = ((y * size + x) * 4) as usize;
            data[idx] = 210;
            data[idx + 1] = 210;
            data[idx + 2] = 210;
            data[idx + 3] = 255;
        }
    }
    data
}

fn process_one(s: &mut Stabilizer, size: u32, data: &mut [u8]) -> vidstab_core::Result<()> {
    let stride = (size as usize) * 4;
    let mut planes = [PlaneMut { data, stride }];
    let mut view = FrameViewMut {
        width: size,
        height: size,
        format: PixelFormat::Bgra,
        planes: &mut planes,
    };
    s.process_frame(&mut view)
}

/// S1: the first frame after initialize is returned unchanged, and the
/// stabilizer immediately reports one processed frame.
#[test]
fn cold_start_returns_first_frame_unchanged() {
    let mut s = Stabilizer::new();
    s.initialize(160, 160, StabilizerParams::default()).expect("init");

    let mut data = bgra_square(160, (50, 50), 40);
    let before = data.clone();
    process_one(&mut s, 160, &mut data).expect("process");

    assert_eq!(data, before);
    assert_eq!(s.metrics().frame_count, 1);
}

/// S2: a square oscillating left/right by a fixed amplitude should settle
/// into a steady processing regime within the smoothing window, without
/// ever panicking or producing out-of-range metrics.
#[test]
fn pure_horizontal_shake_settles_within_smoothing_window() {
    let mut s = Stabilizer::new();
    let params = StabilizerParams::builder().smoothing_radius(30).build();
    s.initialize(200, 200, params).expect("init");

    for i in 0..40u32 {
        let offset = 60 + ((i % 6) as i32 - 3).unsigned_abs();
        let mut data = bgra_square(200, (offset, 60), 60);
        process_one(&mut s, 200, &mut data).expect("process");
    }

    let snapshot = s.metrics();
    assert_eq!(snapshot.frame_count, 40);
    assert!(snapshot.mean_processing_time_ms.is_finite());
    assert!(snapshot.slow_frame_ratio() <= 1.0);
}

/// S3: losing all texture for more than the consecutive-failure budget
/// forces a re-detect, recorded in metrics, and processing continues
/// afterward without the caller seeing an error.
#[test]
fn catastrophic_tracking_loss_recovers_via_forced_redetect() {
    let mut s = Stabilizer::new();
    s.initialize(160, 160, StabilizerParams::default()).expect("init");

    let mut textured = bgra_square(160, (30, 30), 90);
    process_one(&mut s, 160, &mut textured).expect("seed frame");

    for _ in 0..8 {
        let mut blank = vec![0u8; 160 * 160 * 4];
        process_one(&mut s, 160, &mut blank).expect("blank frame");
    }

    let after_loss = s.metrics();
    assert!(after_loss.tracking_failure_count > 0);

    let mut recovered = bgra_square(160, (35, 35), 90);
    process_one(&mut s, 160, &mut recovered).expect("recovery frame");
    assert_eq!(s.metrics().frame_count, 10);
}

/// S4: a live smoothing_radius reduction takes effect without requiring a
/// reset, and frames keep processing normally afterward.
#[test]
fn parameter_update_shrinks_history_without_disrupting_processing() {
    let mut s = Stabilizer::new();
    let wide = StabilizerParams::builder().smoothing_radius(30).build();
    s.initialize(160, 160, wide).expect("init");

    for _ in 0..10 {
        let mut data = bgra_square(160, (40, 40), 60);
        process_one(&mut s, 160, &mut data).expect("process");
    }

    let narrow = StabilizerParams::builder().smoothing_radius(5).build();
    s.update_parameters(narrow);

    for _ in 0..5 {
        let mut data = bgra_square(160, (42, 40), 60);
        process_one(&mut s, 160, &mut data).expect("process after update");
    }

    assert_eq!(s.metrics().frame_count, 15);
}

/// S5: a frame narrower than the minimum supported dimension is rejected at
/// both initialize and process_frame, leaving state untouched.
#[test]
fn undersized_frame_is_rejected() {
    let mut s = Stabilizer::new();
    let err = s
        .initialize(16, 160, StabilizerParams::default())
        .expect_err("16 is below the minimum dimension");
    assert!(matches!(err, InitError::DimensionsOutOfRange { .. }));

    s.initialize(160, 160, StabilizerParams::default()).expect("init at valid size");
    let mut tiny = vec![0u8; 16 * 16 * 4];
    let mut planes = [PlaneMut { data: &mut tiny, stride: 16 * 4 }];
    let mut view = FrameViewMut {
        width: 16,
        height: 16,
        format: PixelFormat::Bgra,
        planes: &mut planes,
    };
    let err = s.process_frame(&mut view).expect_err("mismatched size");
    assert!(matches!(err, ValidationError::DimensionsOutOfRange { .. }));
}

/// S6: sustained large translation under Crop mode never panics and keeps
/// producing full-size frames, even though the inscribed safe rectangle
/// shrinks substantially.
#[test]
fn sustained_translation_under_crop_mode_stays_full_size() {
    let mut s = Stabilizer::new();
    let params = StabilizerParams::builder()
        .edge_mode(EdgeMode::Crop)
        .max_correction(80.0)
        .build();
    s.initialize(256, 256, params).expect("init");

    for i in 0..20u32 {
        let x = 40 + (i * 3).min(150);
        let mut data = bgra_square(256, (x, 60), 100);
        process_one(&mut s, 256, &mut data).expect("process");
    }

    assert_eq!(s.metrics().frame_count, 20);
}
