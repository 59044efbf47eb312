//! Edge Handler: what to do with the border a warp can expose.
//!
//! `Padding` does nothing (a black border may show). `Scale` folds an extra
//! zoom into the transform before the warp ever runs, so no border is ever
//! produced. `Crop` lets the warp run as-is, then resamples the largest
//! guaranteed-filled rectangle back up to the original frame size.
//!
//! The inscribed-rectangle and crop bounds are defensively re-clamped to
//! `[0, w-1] x [0, h-1]` before use: an upstream miscalculation should never
//! produce an out-of-bounds region, however unlikely.

use crate::params::EdgeMode;
use crate::transform::{Decomposed, Transform};

/// An axis-aligned region of a frame, in floating-point pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: f64::from(width),
            h: f64::from(height),
        }
    }

    /// Defensively clamp to the valid pixel range, guarding against a
    /// degenerate or oversized rectangle from upstream computation.
    #[must_use]
    pub fn clamp_to_bounds(self, width: u32, height: u32) -> Self {
        let max_x = f64::from(width.saturating_sub(1)).max(0.0);
        let max_y = f64::from(height.saturating_sub(1)).max(0.0);
        let x = self.x.clamp(0.0, max_x);
        let y = self.y.clamp(0.0, max_y);
        let w = self.w.clamp(1.0, max_x - x + 1.0).max(1.0);
        let h = self.h.clamp(1.0, max_y - y + 1.0).max(1.0);
        Self { x, y, w, h }
    }
}

/// The largest centered rectangle guaranteed to have no border pixels after
/// warping by `transform`, estimated conservatively from the transform's
/// translation, rotation, and scale components.
#[must_use]
pub fn inscribed_rect(transform: &Transform, width: u32, height: u32) -> Rect {
    let d = transform.decompose();
    let w = f64::from(width);
    let h = f64::from(height);
    let half_diag = (w * w + h * h).sqrt() / 2.0;
    let rot_margin = half_diag * d.theta.sin().abs();
    let shrink = if d.scale < 1.0 { 1.0 - d.scale } else { 0.0 };

    let margin_x = (d.tx.abs() + rot_margin + w * shrink / 2.0).min(w / 2.0 - 1.0).max(0.0);
    let margin_y = (d.ty.abs() + rot_margin + h * shrink / 2.0).min(h / 2.0 - 1.0).max(0.0);

    Rect {
        x: margin_x,
        y: margin_y,
        w: (w - 2.0 * margin_x).max(1.0),
        h: (h - 2.0 * margin_y).max(1.0),
    }
    .clamp_to_bounds(width, height)
}

/// A pure zoom about the frame center: maps output coordinates to a smaller
/// region of the input, so the warp samples only interior content.
fn zoom_about_center(factor: f64, width: u32, height: u32) -> Transform {
    let cx = f64::from(width) / 2.0;
    let cy = f64::from(height) / 2.0;
    let inv = 1.0 / factor;
    Transform {
        a00: inv,
        a01: 0.0,
        a02: cx * (1.0 - inv),
        a10: 0.0,
        a11: inv,
        a12: cy * (1.0 - inv),
    }
}

const MAX_SCALE_ZOOM: f64 = 4.0;

/// Compute the transform actually handed to the warp, plus an optional crop
/// rectangle the caller must resample back up to `(width, height)`.
#[must_use]
pub fn effective_transform(
    residual: &Transform,
    mode: EdgeMode,
    width: u32,
    height: u32,
) -> (Transform, Option<Rect>) {
    match mode {
        EdgeMode::Padding => (*residual, None),
        EdgeMode::Crop => {
            let rect = inscribed_rect(residual, width, height);
            (*residual, Some(rect))
        }
        EdgeMode::Scale => {
            let rect = inscribed_rect(residual, width, height);
            let zoom = (f64::from(width) / rect.w)
                .max(f64::from(height) / rect.h)
                .clamp(1.0, MAX_SCALE_ZOOM);
            let zoom_t = zoom_about_center(zoom, width, height);
            (zoom_t.compose(residual), None)
        }
    }
}

/// Resample a single-channel plane region `rect` up to `dst_w x dst_h` with
/// bilinear interpolation, writing `bpp` channels per destination pixel.
#[must_use]
pub fn crop_resize_plane(
    src: &[u8],
    src_stride: usize,
    bpp: usize,
    rect: Rect,
    dst_w: u32,
    dst_h: u32,
    dst_stride: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; dst_stride * dst_h as usize];
    if dst_w == 0 || dst_h == 0 {
        return out;
    }
    let scale_x = rect.w / f64::from(dst_w);
    let scale_y = rect.h / f64::from(dst_h);

    let sample = |x: f64, y: f64, c: usize| -> u8 {
        let max_x = (src_stride / bpp) as f64 - 1.0;
        let x = x.clamp(0.0, max_x.max(0.0));
        let y = y.clamp(0.0, f64::MAX);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min((src_stride / bpp).saturating_sub(1));
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;
        let row0 = y0 * src_stride;
        let row1 = (y0 + 1) * src_stride;
        let at = |row: usize, xi: usize| -> f64 {
            src.get(row + xi * bpp + c).copied().unwrap_or(0) as f64
        };
        let top = at(row0, x0) * (1.0 - fx) + at(row0, x1) * fx;
        let bottom = if row1 + bpp <= src.len() {
            at(row1, x0) * (1.0 - fx) + at(row1, x1) * fx
        } else {
            top
        };
        (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
    };

    for y in 0..dst_h {
        for x in 0..dst_w {
            let sx = rect.x + (f64::from(x) + 0.5) * scale_x;
            let sy = rect.y + (f64::from(y) + 0.5) * scale_y;
            let row = y as usize * dst_stride + x as usize * bpp;
            for c in 0..bpp {
                out[row + c] = sample(sx, sy, c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_yields_full_rect() {
        let rect = inscribed_rect(&Transform::identity(), 100, 100);
        assert!((rect.w - 100.0).abs() < 1e-6);
        assert!((rect.h - 100.0).abs() < 1e-6);
    }

    #[test]
    fn translation_shrinks_inscribed_rect() {
        let t = Transform::from_decomposed(Decomposed {
            tx: 20.0,
            ty: 0.0,
            theta: 0.0,
            scale: 1.0,
        });
        let rect = inscribed_rect(&t, 200, 100);
        assert!(rect.w < 200.0);
        assert!(rect.x >= 20.0 - 1e-6);
    }

    #[test]
    fn clamp_to_bounds_never_exceeds_frame() {
        let rect = Rect { x: -5.0, y: -5.0, w: 10_000.0, h: 10_000.0 }.clamp_to_bounds(64, 64);
        assert!(rect.x >= 0.0 && rect.y >= 0.0);
        assert!(rect.x + rect.w <= 64.0);
        assert!(rect.y + rect.h <= 64.0);
    }

    #[test]
    fn padding_mode_is_pass_through() {
        let t = Transform::from_decomposed(Decomposed {
            tx: 10.0,
            ty: 5.0,
            theta: 0.02,
            scale: 1.0,
        });
        let (eff, rect) = effective_transform(&t, EdgeMode::Padding, 100, 100);
        assert_eq!(eff, t);
        assert!(rect.is_none());
    }

    #[test]
    fn scale_mode_never_exceeds_max_zoom() {
        let t = Transform::from_decomposed(Decomposed {
            tx: 500.0,
            ty: 500.0,
            theta: 0.0,
            scale: 1.0,
        });
        let (eff, rect) = effective_transform(&t, EdgeMode::Scale, 100, 100);
        assert!(rect.is_none());
        let d = eff.decompose();
        assert!(d.scale <= MAX_SCALE_ZOOM * 1.01);
    }

    #[test]
    fn crop_resize_of_full_rect_is_near_identity() {
        let mut data = vec![0u8; 8 * 8];
        for (i, v) in data.iter_mut().enumerate() {
            *v = (i % 256) as u8;
        }
        let rect = Rect::full(8, 8);
        let out = crop_resize_plane(&data, 8, 1, rect, 8, 8, 8);
        assert_eq!(out.len(), data.len());
    }
}
