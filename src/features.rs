//! Feature detection and optical-flow tracking.
//!
//! These are defined as black-box collaborators behind two small traits:
//! [`FeatureDetector`] and [`OpticalFlowTracker`]. Corner detection and
//! sparse optical flow have no off-the-shelf dependency-free crate worth
//! pulling in for this, so this module supplies one dependency-free default
//! implementation of each, sufficient to drive the stabilizer end to end.
//! Hosts that already bind a real computer-vision library can supply their
//! own implementation instead.

use crate::frame::GrayFrame;
use crate::params::StabilizerParams;

/// A tracked or detected feature point, in image pixel coordinates.
pub type Point = (f64, f64);

/// The outcome of tracking one point from the previous frame into the
/// current one.
#[derive(Debug, Clone, Copy)]
pub struct TrackedPoint {
    pub point: Point,
    pub status: bool,
    pub error: f64,
}

/// Corner-style feature detection (Shi-Tomasi or Harris).
pub trait FeatureDetector {
    /// Detect up to `params.feature_count` trackable points in `gray`.
    fn detect(&self, gray: &GrayFrame, params: &StabilizerParams) -> Vec<Point>;
}

/// Sparse optical-flow tracking between two grayscale frames.
pub trait OpticalFlowTracker {
    /// Track each of `prev_points` from `prev_gray` into `curr_gray`.
    /// Returns one [`TrackedPoint`] per input point, in the same order.
    fn track(
        &self,
        prev_gray: &GrayFrame,
        curr_gray: &GrayFrame,
        prev_points: &[Point],
    ) -> Vec<TrackedPoint>;
}

/// Simple Sobel-style image gradients, used by both the detector and the
/// tracker's per-window normal equations.
struct Gradients {
    ix: Vec<f64>,
    iy: Vec<f64>,
    width: u32,
    height: u32,
}

impl Gradients {
    fn compute(gray: &GrayFrame) -> Self {
        let (w, h) = (gray.width, gray.height);
        let mut ix = vec![0.0f64; (w as usize) * (h as usize)];
        let mut iy = vec![0.0f64; (w as usize) * (h as usize)];
        for y in 0..h {
            for x in 0..w {
                let xl = x.saturating_sub(1);
                let xr = (x + 1).min(w - 1);
                let yu = y.saturating_sub(1);
                let yd = (y + 1).min(h - 1);
                let gx = f64::from(gray.get(xr, y)) - f64::from(gray.get(xl, y));
                let gy = f64::from(gray.get(x, yd)) - f64::from(gray.get(x, yu));
                let idx = (y as usize) * (w as usize) + x as usize;
                ix[idx] = gx * 0.5;
                iy[idx] = gy * 0.5;
            }
        }
        Self {
            ix,
            iy,
            width: w,
            height: h,
        }
    }

    fn at(&self, x: u32, y: u32) -> (f64, f64) {
        let idx = (y as usize) * (self.width as usize) + x as usize;
        (self.ix[idx], self.iy[idx])
    }
}

/// Default corner detector: Shi-Tomasi min-eigenvalue response, or Harris
/// response when `params.use_harris` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShiTomasiDetector;

impl FeatureDetector for ShiTomasiDetector {
    fn detect(&self, gray: &GrayFrame, params: &StabilizerParams) -> Vec<Point> {
        let (w, h) = (gray.width, gray.height);
        if w < 3 || h < 3 {
            return Vec::new();
        }
        let grad = Gradients::compute(gray);
        let half_block = (params.block_size / 2).max(1);

        let mut scores = Vec::with_capacity((w as usize) * (h as usize));
        let mut max_score = 0.0f64;

        for y in half_block..h.saturating_sub(half_block) {
            for x in half_block..w.saturating_sub(half_block) {
                let (sxx, syy, sxy) = window_structure_sums(&grad, x, y, half_block);
                let score = if params.use_harris {
                    let det = sxx * syy - sxy * sxy;
                    let trace = sxx + syy;
                    det - params.harris_k * trace * trace
                } else {
                    let trace = sxx + syy;
                    let diff = sxx - syy;
                    (trace - (diff * diff + 4.0 * sxy * sxy).sqrt()) / 2.0
                };
                if score > 0.0 {
                    max_score = max_score.max(score);
                    scores.push((score, x, y));
                }
            }
        }

        if scores.is_empty() {
            return Vec::new();
        }

        let threshold = params.quality_level * max_score;
        scores.retain(|(s, _, _)| *s >= threshold);
        scores.sort_by(|a, b| b.0.total_cmp(&a.0));

        select_with_min_distance(&scores, params.min_distance, params.feature_count as usize)
    }
}

fn window_structure_sums(grad: &Gradients, cx: u32, cy: u32, half_block: u32) -> (f64, f64, f64) {
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for dy in -(half_block as i64)..=(half_block as i64) {
        let y = (cy as i64 + dy) as u32;
        if y >= grad.height {
            continue;
        }
        for dx in -(half_block as i64)..=(half_block as i64) {
            let x = (cx as i64 + dx) as u32;
            if x >= grad.width {
                continue;
            }
            let (gx, gy) = grad.at(x, y);
            sxx += gx * gx;
            syy += gy * gy;
            sxy += gx * gy;
        }
    }
    (sxx, syy, sxy)
}

/// Greedily keep the highest-scoring points subject to a minimum pairwise
/// pixel distance, using a coarse grid bucket keyed on `min_distance` to
/// avoid an O(n^2) scan against every already-accepted point.
fn select_with_min_distance(
    scored: &[(f64, u32, u32)],
    min_distance: f64,
    max_points: usize,
) -> Vec<Point> {
    let cell = min_distance.max(1.0);
    let mut occupied: std::collections::HashSet<(i64, i64)> = std::collections::HashSet::new();
    let mut accepted = Vec::with_capacity(max_points);

    'outer: for &(_, x, y) in scored {
        if accepted.len() >= max_points {
            break;
        }
        let (fx, fy) = (f64::from(x), f64::from(y));
        let (cx, cy) = ((fx / cell).floor() as i64, (fy / cell).floor() as i64);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if occupied.contains(&(cx + dx, cy + dy)) {
                    // Neighboring bucket already has a point; verify real distance.
                    for &(ax, ay) in &accepted {
                        let d: (f64, f64) = (ax, ay);
                        let dist = ((fx - d.0).powi(2) + (fy - d.1).powi(2)).sqrt();
                        if dist < min_distance {
                            continue 'outer;
                        }
                    }
                }
            }
        }
        occupied.insert((cx, cy));
        accepted.push((fx, fy));
    }

    accepted
}

/// Number of pyramid levels built by [`LucasKanadeTracker`]. Coarse-to-fine
/// tracking handles larger inter-frame displacements than single-level LK.
const PYRAMID_LEVELS: usize = 3;
const LK_WINDOW_HALF: i64 = 7;
const LK_MAX_ITERATIONS: usize = 12;
const LK_MIN_EIGENVALUE: f64 = 1e-4;

/// Default pyramidal Lucas-Kanade sparse optical-flow tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct LucasKanadeTracker;

fn downsample(frame: &GrayFrame) -> GrayFrame {
    let w = (frame.width / 2).max(1);
    let h = (frame.height / 2).max(1);
    let mut out = GrayFrame::blank(w, h);
    for y in 0..h {
        for x in 0..w {
            let sx = (x * 2).min(frame.width - 1);
            let sy = (y * 2).min(frame.height - 1);
            let sx1 = (sx + 1).min(frame.width - 1);
            let sy1 = (sy + 1).min(frame.height - 1);
            let sum = u32::from(frame.get(sx, sy))
                + u32::from(frame.get(sx1, sy))
                + u32::from(frame.get(sx, sy1))
                + u32::from(frame.get(sx1, sy1));
            out.set(x, y, (sum / 4) as u8);
        }
    }
    out
}

fn build_pyramid(frame: &GrayFrame) -> Vec<GrayFrame> {
    let mut levels = Vec::with_capacity(PYRAMID_LEVELS);
    levels.push(frame.clone());
    for _ in 1..PYRAMID_LEVELS {
        let prev = levels.last().expect("at least one level");
        if prev.width <= 4 || prev.height <= 4 {
            break;
        }
        levels.push(downsample(prev));
    }
    levels
}

/// Run one level of Lucas-Kanade refinement around `(px, py)` in `prev`,
/// warping into `curr` with the current flow guess `(gx, gy)`.
///
/// Returns the refined flow and the window's minimum structure-tensor
/// eigenvalue (used as a trackability/confidence signal).
fn refine_flow(
    prev: &GrayFrame,
    curr: &GrayFrame,
    px: f64,
    py: f64,
    mut flow: (f64, f64),
) -> Option<((f64, f64), f64, f64)> {
    let grad = Gradients::compute(prev);

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    let mut samples = Vec::new();

    for dy in -LK_WINDOW_HALF..=LK_WINDOW_HALF {
        for dx in -LK_WINDOW_HALF..=LK_WINDOW_HALF {
            let x = px + dx as f64;
            let y = py + dy as f64;
            if x < 0.0 || y < 0.0 || x >= f64::from(prev.width) || y >= f64::from(prev.height) {
                continue;
            }
            let xi = x.round() as u32;
            let yi = y.round() as u32;
            let (gx, gy) = grad.at(xi.min(prev.width - 1), yi.min(prev.height - 1));
            sxx += gx * gx;
            syy += gy * gy;
            sxy += gx * gy;
            samples.push((x, y, gx, gy, f64::from(prev.get(xi.min(prev.width - 1), yi.min(prev.height - 1)))));
        }
    }

    if samples.is_empty() {
        return None;
    }

    let trace = sxx + syy;
    let diff = sxx - syy;
    let min_eig = (trace - (diff * diff + 4.0 * sxy * sxy).sqrt()) / 2.0;
    if min_eig < LK_MIN_EIGENVALUE {
        return None;
    }

    let det = sxx * syy - sxy * sxy;
    if det.abs() < 1e-9 {
        return None;
    }

    let mut last_error = f64::MAX;
    for _ in 0..LK_MAX_ITERATIONS {
        let mut bx = 0.0;
        let mut by = 0.0;
        let mut sum_abs_err = 0.0;
        let mut count = 0usize;

        for &(x, y, gx, gy, prev_val) in &samples {
            let wx = x + flow.0;
            let wy = y + flow.1;
            let Some(curr_val) = curr.sample_bilinear(wx, wy) else {
                continue;
            };
            let it = f64::from(curr_val) - prev_val;
            bx += -gx * it;
            by += -gy * it;
            sum_abs_err += it.abs();
            count += 1;
        }

        if count == 0 {
            return None;
        }

        let dx = (syy * bx - sxy * by) / det;
        let dy = (sxx * by - sxy * bx) / det;
        flow.0 += dx;
        flow.1 += dy;
        last_error = sum_abs_err / count as f64;

        if dx.abs() < 1e-3 && dy.abs() < 1e-3 {
            break;
        }
    }

    Some((flow, min_eig, last_error))
}

impl OpticalFlowTracker for LucasKanadeTracker {
    fn track(
        &self,
        prev_gray: &GrayFrame,
        curr_gray: &GrayFrame,
        prev_points: &[Point],
    ) -> Vec<TrackedPoint> {
        let prev_pyramid = build_pyramid(prev_gray);
        let curr_pyramid = build_pyramid(curr_gray);
        let levels = prev_pyramid.len().min(curr_pyramid.len());

        prev_points
            .iter()
            .map(|&(px, py)| {
                let mut flow = (0.0, 0.0);
                let mut last_error = f64::MAX;
                let mut ok = true;

                for level in (0..levels).rev() {
                    let scale = 2f64.powi(level as i32);
                    let lx = px / scale;
                    let ly = py / scale;
                    flow = (flow.0 * 2.0, flow.1 * 2.0);
                    match refine_flow(&prev_pyramid[level], &curr_pyramid[level], lx, ly, (flow.0 / 2.0, flow.1 / 2.0)) {
                        Some((new_flow, _eig, err)) => {
                            flow = new_flow;
                            last_error = err;
                        }
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }

                let dest = (px + flow.0, py + flow.1);
                let in_bounds = crate::params::is_valid_point(
                    dest.0,
                    dest.1,
                    curr_gray.width,
                    curr_gray.height,
                );

                TrackedPoint {
                    point: dest,
                    status: ok && in_bounds,
                    error: last_error,
                }
            })
            .collect()
    }
}
