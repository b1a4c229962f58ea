//! Iterative sub-pixel corner refinement.
//!
//! At the true corner `q`, every image gradient `g(p)` in a small window is
//! orthogonal to `p - q`: either `p` lies in a flat region (`g = 0`) or on an
//! edge through `q` (`g ⟂ p - q`). Minimising `Σ w(p) (g(p)ᵀ(p - q))²` gives
//! the 2x2 system `(Σ w g gᵀ) q = Σ w g gᵀ p`, re-solved around each new
//! estimate.

use crate::params::SubPixParams;
use chesscal_core::{sample_bilinear_clamped, GrayImageView};
use nalgebra::Point2;
use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Refine one corner. Returns `start` if the estimate leaves the window.
pub fn refine_corner(img: &GrayImageView<'_>, start: Point2<f64>, params: &SubPixParams) -> Point2<f64> {
    let win = params.win_radius as i32;
    if win == 0 || img.width == 0 || img.height == 0 {
        return start;
    }
    let side = 2 * win + 1;
    let patch_side = (side + 2) as usize;
    let coeff = 1.0 / (win * win) as f64;
    let mask_1d: Vec<f64> = (-win..=win).map(|i| (-(i * i) as f64 * coeff).exp()).collect();

    let mut patch = vec![0.0f64; patch_side * patch_side];
    let mut q = start;

    for _ in 0..params.max_iters.max(1) {
        // Window plus a one-pixel border for central differences.
        for (k, v) in patch.iter_mut().enumerate() {
            let px = (k % patch_side) as f64 - (win + 1) as f64;
            let py = (k / patch_side) as f64 - (win + 1) as f64;
            *v = sample_bilinear_clamped(img, (q.x + px) as f32, (q.y + py) as f32) as f64;
        }

        let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
        let (mut bb1, mut bb2) = (0.0, 0.0);
        for i in 0..side as usize {
            let py = i as f64 - win as f64;
            for j in 0..side as usize {
                let px = j as f64 - win as f64;
                let m = mask_1d[i] * mask_1d[j];
                let at = |r: usize, col: usize| patch[r * patch_side + col];
                let gx = at(i + 1, j + 2) - at(i + 1, j);
                let gy = at(i + 2, j + 1) - at(i, j + 1);
                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * a.max(c).max(1.0) {
            break;
        }
        let dx = (c * bb1 - b * bb2) / det;
        let dy = (a * bb2 - b * bb1) / det;
        q = Point2::new(q.x + dx, q.y + dy);

        if dx * dx + dy * dy <= params.eps * params.eps {
            break;
        }
    }

    let w = win as f64;
    if (q.x - start.x).abs() > w || (q.y - start.y).abs() > w || !q.x.is_finite() || !q.y.is_finite() {
        return start;
    }
    q
}

/// Refine all corners in parallel; output is index-aligned with `corners`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, corners, params), fields(corners = corners.len()))
)]
pub fn refine_corners(img: &GrayImageView<'_>, corners: &[Point2<f64>], params: &SubPixParams) -> Vec<Point2<f64>> {
    corners
        .par_iter()
        .map(|&p| refine_corner(img, p, params))
        .collect()
}
