//! Closed-form intrinsics from plane homographies.

use crate::camera::CameraIntrinsics;
use log::{debug, warn};
use nalgebra::{DMatrix, Matrix3, SVector, Vector2, Vector3};

/// Zhang's constraint row `v_ij` for `B = K^-T K^-1` with `B12 = 0`.
///
/// Unknowns are ordered `(B11, B22, B13, B23, B33)`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 5> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 5>::from_row_slice(&[
        hi[0] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Relative singular value below which the Zhang system counts as rank deficient.
const RANK_TOL: f64 = 1e-9;

/// Maps pixels to roughly `[-1, 1]` around the image centre.
fn size_normalization(image_size: (usize, usize)) -> Matrix3<f64> {
    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    let s = 0.5 * (w + h).max(2.0);
    let (cx, cy) = image_centre(image_size);
    Matrix3::new(1.0 / s, 0.0, -cx / s, 0.0, 1.0 / s, -cy / s, 0.0, 0.0, 1.0)
}

fn image_centre(image_size: (usize, usize)) -> (f64, f64) {
    (
        (image_size.0.max(1) - 1) as f64 * 0.5,
        (image_size.1.max(1) - 1) as f64 * 0.5,
    )
}

/// Zero-skew Zhang solution over `homographies` (board plane to pixels).
///
/// Returns `None` when the system is degenerate or yields a non-positive or
/// non-finite focal length.
pub fn zhang_zero_skew(
    homographies: &[Matrix3<f64>],
    image_size: (usize, usize),
) -> Option<CameraIntrinsics> {
    if homographies.is_empty() {
        return None;
    }
    let n = size_normalization(image_size);
    let n_inv = n.try_inverse()?;

    // Pad to a square-or-tall system so the thin SVD exposes the null vector.
    let rows = (2 * homographies.len()).max(5);
    let mut v = DMatrix::<f64>::zeros(rows, 5);
    for (k, h) in homographies.iter().enumerate() {
        let hn = n * h;
        let norm = hn.norm();
        if !(norm.is_finite() && norm > 0.0) {
            return None;
        }
        let hn = hn / norm;
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        let v12 = v_ij(&hn, 0, 1);
        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = v.svd(false, true);
    let v_t = svd.v_t?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));
    let min_idx = order[0];
    // The null space must be one-dimensional, otherwise B is arbitrary.
    let largest = svd.singular_values.max();
    if svd.singular_values[order[1]] <= RANK_TOL * largest {
        debug!("zhang: rank-deficient system over {} views", homographies.len());
        return None;
    }
    let mut b = v_t.row(min_idx).transpose();
    if b[0] < 0.0 {
        b = -b;
    }
    let (b11, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4]);
    if b11 <= 0.0 || b22 <= 0.0 {
        debug!("zhang: B not positive definite ({b11:.3e}, {b22:.3e})");
        return None;
    }

    let u0 = -b13 / b11;
    let v0 = -b23 / b22;
    let lambda = b33 - b13 * b13 / b11 - b23 * b23 / b22;
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda / b22).sqrt();

    let k_norm = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let k = CameraIntrinsics::from_matrix(&(n_inv * k_norm));
    k.is_valid().then_some(k)
}

/// Focal lengths with the principal point fixed at the image centre.
///
/// For each homography, the images of the board axes `h1, h2` and of the
/// diagonals `(h1 ± h2) / 2` are orthogonal under `diag(1/fx², 1/fy², 1)`;
/// the two unknowns are solved in least squares over all views.
pub fn centred_focal_estimate(
    homographies: &[Matrix3<f64>],
    image_size: (usize, usize),
) -> Option<CameraIntrinsics> {
    if homographies.is_empty() {
        return None;
    }
    let (cx, cy) = image_centre(image_size);
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let m = homographies.len();
    let mut a = DMatrix::<f64>::zeros(2 * m, 2);
    let mut rhs = DMatrix::<f64>::zeros(2 * m, 1);
    for (k, h) in homographies.iter().enumerate() {
        let hs = shift * h;
        let c0: Vector3<f64> = hs.column(0).into_owned();
        let c1: Vector3<f64> = hs.column(1).into_owned();
        let pairs = [(c0, c1), ((c0 + c1) * 0.5, (c0 - c1) * 0.5)];
        for (r, (p, q)) in pairs.iter().enumerate() {
            let (np, nq) = (p.norm(), q.norm());
            if np <= 0.0 || nq <= 0.0 {
                return None;
            }
            let (p, q) = (p / np, q / nq);
            a[(2 * k + r, 0)] = p.x * q.x;
            a[(2 * k + r, 1)] = p.y * q.y;
            rhs[(2 * k + r, 0)] = -p.z * q.z;
        }
    }

    let f = a.svd(true, true).solve(&rhs, 1e-15).ok()?;
    let f = Vector2::new(f[(0, 0)], f[(1, 0)]);
    let k = CameraIntrinsics {
        fx: (1.0 / f.x.abs()).sqrt(),
        fy: (1.0 / f.y.abs()).sqrt(),
        cx,
        cy,
    };
    k.is_valid().then_some(k)
}

/// Closed-form intrinsics, falling back to [`centred_focal_estimate`] when
/// the Zhang system has no valid solution.
pub fn initial_intrinsics(
    homographies: &[Matrix3<f64>],
    image_size: (usize, usize),
) -> Option<CameraIntrinsics> {
    zhang_zero_skew(homographies, image_size).or_else(|| {
        warn!("closed-form intrinsics degenerate; principal point fixed at image centre");
        centred_focal_estimate(homographies, image_size)
    })
}
