//! 2x3 affine transform algebra.
//!
//! Transforms are stored as six doubles, row-major, with the implicit
//! `[0 0 1]` bottom row. A point `(x, y)` maps to:
//! `(a00*x + a01*y + a02, a10*x + a11*y + a12)`.

use crate::constants::{MIN_INVERTIBLE_DETERMINANT, TRANSFORM_SCALE_RANGE};

/// A 2x3 affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a00: f64,
    pub a01: f64,
    pub a02: f64,
    pub a10: f64,
    pub a11: f64,
    pub a12: f64,
}

/// Decomposed affine parameters: translation, rotation, uniform scale.
///
/// Used by [`Transform::weighted_mean`] and [`Transform::subtract`] to average
/// and difference transforms in a numerically stable space rather than
/// averaging matrix entries directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    pub tx: f64,
    pub ty: f64,
    pub theta: f64,
    pub scale: f64,
}

impl Transform {
    /// The identity transform.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            a00: 1.0,
            a01: 0.0,
            a02: 0.0,
            a10: 0.0,
            a11: 1.0,
            a12: 0.0,
        }
    }

    /// Build a transform from decomposed parameters.
    #[must_use]
    pub fn from_decomposed(d: Decomposed) -> Self {
        let (sin_t, cos_t) = d.theta.sin_cos();
        Self {
            a00: d.scale * cos_t,
            a01: -d.scale * sin_t,
            a02: d.tx,
            a10: d.scale * sin_t,
            a11: d.scale * cos_t,
            a12: d.ty,
        }
    }

    /// Decompose into `(tx, ty, theta, scale)`.
    #[must_use]
    pub fn decompose(&self) -> Decomposed {
        Decomposed {
            tx: self.a02,
            ty: self.a12,
            theta: self.a10.atan2(self.a00),
            scale: (self.a00 * self.a00 + self.a10 * self.a10).sqrt(),
        }
    }

    /// Whether every entry is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        [self.a00, self.a01, self.a02, self.a10, self.a11, self.a12]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Compose two transforms: apply `self` then `other` (matrix multiply,
    /// embedding the implicit `[0 0 1]` row).
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            a00: other.a00 * self.a00 + other.a01 * self.a10,
            a01: other.a00 * self.a01 + other.a01 * self.a11,
            a02: other.a00 * self.a02 + other.a01 * self.a12 + other.a02,
            a10: other.a10 * self.a00 + other.a11 * self.a10,
            a11: other.a10 * self.a01 + other.a11 * self.a11,
            a12: other.a10 * self.a02 + other.a11 * self.a12 + other.a12,
        }
    }

    /// Analytic inverse. Fails if `|det| < MIN_INVERTIBLE_DETERMINANT`.
    pub fn invert(&self) -> Option<Self> {
        let det = self.a00 * self.a11 - self.a01 * self.a10;
        if det.abs() < MIN_INVERTIBLE_DETERMINANT {
            return None;
        }
        let inv_det = 1.0 / det;
        let a00 = self.a11 * inv_det;
        let a01 = -self.a01 * inv_det;
        let a10 = -self.a10 * inv_det;
        let a11 = self.a00 * inv_det;
        let a02 = -(a00 * self.a02 + a01 * self.a12);
        let a12 = -(a10 * self.a02 + a11 * self.a12);
        Some(Self {
            a00,
            a01,
            a02,
            a10,
            a11,
            a12,
        })
    }

    /// Gaussian-weighted average of a list of transforms, decomposed into
    /// parameter space. `weights` must be the same length as
    /// `transforms` and need not be pre-normalized. Angles are averaged via
    /// unit-vector sum to avoid wraparound bias.
    ///
    /// Returns [`Transform::identity`] if `transforms` is empty.
    #[must_use]
    pub fn weighted_mean(transforms: &[Self], weights: &[f64]) -> Self {
        debug_assert_eq!(transforms.len(), weights.len());
        if transforms.is_empty() {
            return Self::identity();
        }

        let total_weight: f64 = weights.iter().sum();
        if total_weight <= 0.0 {
            return *transforms.last().expect("non-empty checked above");
        }

        let mut tx = 0.0;
        let mut ty = 0.0;
        let mut scale = 0.0;
        let mut sin_sum = 0.0;
        let mut cos_sum = 0.0;

        for (t, w) in transforms.iter().zip(weights.iter()) {
            let d = t.decompose();
            let w = *w / total_weight;
            tx += d.tx * w;
            ty += d.ty * w;
            scale += d.scale * w;
            sin_sum += d.theta.sin() * w;
            cos_sum += d.theta.cos() * w;
        }

        let theta = sin_sum.atan2(cos_sum);
        Self::from_decomposed(Decomposed {
            tx,
            ty,
            theta,
            scale,
        })
    }

    /// Parameter-space difference `current - smoothed`, producing the
    /// residual transform actually applied to the frame.
    #[must_use]
    pub fn subtract(current: &Self, smoothed: &Self) -> Self {
        let c = current.decompose();
        let s = smoothed.decompose();
        Self::from_decomposed(Decomposed {
            tx: c.tx - s.tx,
            ty: c.ty - s.ty,
            theta: c.theta - s.theta,
            scale: if s.scale.abs() > f64::EPSILON {
                c.scale / s.scale
            } else {
                c.scale
            },
        })
    }

    /// Transform sanity finite entries, scale in `[0.5, 1.5]`,
    /// translations within `max_displacement`.
    #[must_use]
    pub fn is_valid(&self, max_displacement: f64) -> bool {
        if !self.is_finite() {
            return false;
        }
        let d = self.decompose();
        let (lo, hi) = TRANSFORM_SCALE_RANGE;
        if d.scale < lo || d.scale > hi {
            return false;
        }
        d.tx.abs() <= max_displacement && d.ty.abs() <= max_displacement
    }

    /// Apply this transform to a single point.
    #[must_use]
    pub fn apply_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a00 * x + self.a01 * y + self.a02,
            self.a10 * x + self.a11 * y + self.a12,
        )
    }

    /// Clamp translation components to `+-limit`.
    #[must_use]
    pub fn clamp_translation(&self, limit_x: f64, limit_y: f64) -> Self {
        Self {
            a02: self.a02.clamp(-limit_x, limit_x),
            a12: self.a12.clamp(-limit_y, limit_y),
            ..*self
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
