//! Board pose from a plane homography and known intrinsics.

use crate::camera::ViewPose;
use nalgebra::{Matrix3, Rotation3, Vector3};

/// Decompose `H = λ K [r1 r2 t]` into a pose mapping board points into the
/// camera frame.
///
/// The scale sign is chosen so the board lies in front of the camera
/// (`t.z > 0`), and `[r1 r2 r1×r2]` is projected onto SO(3).
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<ViewPose> {
    let k_inv = k.try_inverse()?;
    let a = k_inv * h;
    let a1: Vector3<f64> = a.column(0).into_owned();
    let a2: Vector3<f64> = a.column(1).into_owned();
    let a3: Vector3<f64> = a.column(2).into_owned();

    let norm = 0.5 * (a1.norm() + a2.norm());
    if !(norm.is_finite() && norm > f64::EPSILON) {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let flipped = -u.column(2).into_owned();
        u.set_column(2, &flipped);
        r_orth = u * v_t;
    }

    Some(ViewPose::new(
        Rotation3::from_matrix_unchecked(r_orth),
        a3 * lambda,
    ))
}
