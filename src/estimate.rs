//! RANSAC estimation of a partial 2D affine (rotation, uniform scale,
//! translation) from matched point correspondences.
//!
//! No crate in this lineage depends on `rand`; estimation needs only a
//! small, reproducible source of randomness for sample selection, so this
//! module carries a minimal xorshift generator rather than pulling in a
//! general-purpose RNG crate for one call site.

use crate::features::Point;
use crate::transform::Transform;

/// Deterministic xorshift64* generator, seeded per call so repeated runs over
/// the same input are reproducible (useful for scenario tests).
struct Xorshift64(u64);

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_index(&mut self, bound: usize) -> usize {
        (self.next_u64() as usize) % bound
    }
}

const RANSAC_ITERATIONS: usize = 200;

/// Fit a partial affine (no shear) from two point pairs using the closed-form
/// least-squares solution for rotation + uniform scale + translation.
fn fit_partial_affine(prev: &[Point], curr: &[Point]) -> Option<Transform> {
    let n = prev.len();
    if n < 2 {
        return None;
    }

    let mean = |pts: &[Point]| -> (f64, f64) {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (sx / n as f64, sy / n as f64)
    };

    let (mpx, mpy) = mean(prev);
    let (mcx, mcy) = mean(curr);

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syx = 0.0;
    let mut syy = 0.0;
    let mut var = 0.0;

    for (p, c) in prev.iter().zip(curr.iter()) {
        let px = p.0 - mpx;
        let py = p.1 - mpy;
        let cx = c.0 - mcx;
        let cy = c.1 - mcy;
        sxx += px * cx;
        sxy += px * cy;
        syx += py * cx;
        syy += py * cy;
        var += px * px + py * py;
    }

    if var.abs() < 1e-9 {
        return None;
    }

    // Closed-form rotation + uniform scale (Umeyama-style, restricted to
    // rotation + scale, no reflection):
    let a = (sxx + syy) / var;
    let b = (syx - sxy) / var;
    let scale = (a * a + b * b).sqrt();
    if scale < 1e-6 {
        return None;
    }
    let theta = b.atan2(a);

    let (sin_t, cos_t) = theta.sin_cos();
    let tx = mcx - scale * (cos_t * mpx - sin_t * mpy);
    let ty = mcy - scale * (sin_t * mpx + cos_t * mpy);

    Some(Transform {
        a00: scale * cos_t,
        a01: -scale * sin_t,
        a02: tx,
        a10: scale * sin_t,
        a11: scale * cos_t,
        a12: ty,
    })
}

fn residual(t: &Transform, p: Point, c: Point) -> f64 {
    let (px, py) = t.apply_point(p.0, p.1);
    ((px - c.0).powi(2) + (py - c.1).powi(2)).sqrt()
}

/// The outcome of a successful RANSAC fit: the model and the indices of the
/// correspondences it judged inliers.
pub struct RansacResult {
    pub transform: Transform,
    pub inliers: Vec<usize>,
}

/// Estimate a partial affine mapping `prev -> curr` via RANSAC.
///
/// `threshold` is the inlier distance threshold in pixels, already
/// interpolated by the caller from `[ransac_threshold_min, ransac_threshold_max]`
/// proportional to the image diagonal. Returns `None` if fewer than two
/// correspondences are given or no sample yields a usable model.
pub fn estimate_partial_affine(
    prev: &[Point],
    curr: &[Point],
    threshold: f64,
    seed: u64,
) -> Option<RansacResult> {
    let n = prev.len();
    if n < 2 || curr.len() != n {
        return None;
    }

    let mut rng = Xorshift64::new(seed);
    let mut best: Option<RansacResult> = None;

    for _ in 0..RANSAC_ITERATIONS {
        let i = rng.next_index(n);
        let mut j = rng.next_index(n);
        if j == i {
            j = (j + 1) % n;
        }

        let sample_prev = [prev[i], prev[j]];
        let sample_curr = [curr[i], curr[j]];

        let Some(model) = fit_partial_affine(&sample_prev, &sample_curr) else {
            continue;
        };

        let inliers: Vec<usize> = (0..n)
            .filter(|&k| residual(&model, prev[k], curr[k]) <= threshold)
            .collect();

        let is_better = best
            .as_ref()
            .map(|b| inliers.len() > b.inliers.len())
            .unwrap_or(true);

        if is_better && inliers.len() >= 2 {
            best = Some(RansacResult {
                transform: model,
                inliers,
            });
        }
    }

    // Refit the final model on all inliers for a better least-squares fit
    // than the minimal two-point sample.
    if let Some(result) = best.as_mut() {
        let inlier_prev: Vec<Point> = result.inliers.iter().map(|&i| prev[i]).collect();
        let inlier_curr: Vec<Point> = result.inliers.iter().map(|&i| curr[i]).collect();
        if let Some(refit) = fit_partial_affine(&inlier_prev, &inlier_curr) {
            result.transform = refit;
        }
    }

    best
}

/// Bounding-box diagonal of the inlier point set, used to reject
/// low-spread correspondences before accepting a transform.
#[must_use]
pub fn point_spread(points: &[Point]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for &(x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    ((max_x - min_x).powi(2) + (max_y - min_y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Decomposed;

    fn synthetic_pairs(t: &Transform, n: usize) -> (Vec<Point>, Vec<Point>) {
        let mut prev = Vec::with_capacity(n);
        let mut curr = Vec::with_capacity(n);
        for i in 0..n {
            let x = (i as f64 * 13.0) % 200.0;
            let y = (i as f64 * 37.0) % 150.0;
            prev.push((x, y));
            curr.push(t.apply_point(x, y));
        }
        (prev, curr)
    }

    #[test]
    fn recovers_pure_translation() {
        let t = Transform::from_decomposed(Decomposed {
            tx: 5.0,
            ty: -3.0,
            theta: 0.0,
            scale: 1.0,
        });
        let (prev, curr) = synthetic_pairs(&t, 30);
        let result = estimate_partial_affine(&prev, &curr, 1.0, 42).expect("should fit");
        let d = result.transform.decompose();
        assert!((d.tx - 5.0).abs() < 0.5);
        assert!((d.ty + 3.0).abs() < 0.5);
        assert_eq!(result.inliers.len(), 30);
    }

    #[test]
    fn recovers_rotation_and_scale() {
        let t = Transform::from_decomposed(Decomposed {
            tx: 2.0,
            ty: 1.0,
            theta: 0.05,
            scale: 1.1,
        });
        let (prev, curr) = synthetic_pairs(&t, 40);
        let result = estimate_partial_affine(&prev, &curr, 1.0, 7).expect("should fit");
        let d = result.transform.decompose();
        assert!((d.theta - 0.05).abs() < 0.01);
        assert!((d.scale - 1.1).abs() < 0.01);
    }

    #[test]
    fn rejects_outliers() {
        let t = Transform::from_decomposed(Decomposed {
            tx: 4.0,
            ty: 4.0,
            theta: 0.0,
            scale: 1.0,
        });
        let (mut prev, mut curr) = synthetic_pairs(&t, 30);
        // Inject gross outliers.
        for i in 0..5 {
            prev.push((i as f64 * 5.0, i as f64 * 5.0));
            curr.push((500.0 + i as f64, 500.0 - i as f64));
        }
        let result = estimate_partial_affine(&prev, &curr, 1.0, 99).expect("should fit");
        assert!(result.inliers.len() >= 30);
        assert!(result.inliers.len() < prev.len());
    }

    #[test]
    fn too_few_points_returns_none() {
        assert!(estimate_partial_affine(&[(0.0, 0.0)], &[(1.0, 1.0)], 1.0, 1).is_none());
    }

    #[test]
    fn point_spread_of_single_point_is_zero() {
        assert_eq!(point_spread(&[(5.0, 5.0)]), 0.0);
    }

    #[test]
    fn point_spread_measures_bbox_diagonal() {
        let pts = [(0.0, 0.0), (3.0, 4.0)];
        assert!((point_spread(&pts) - 5.0).abs() < 1e-9);
    }
}
