//! Pinhole camera with Brown-Conrady distortion and the analytic derivatives
//! of its projection.
//!
//! A board point `X` is mapped to pixels as
//!
//! ```text
//! Xc = R(ω) X + t,  (x, y) = (Xc.x / Xc.z, Xc.y / Xc.z)
//! (xd, yd) = distort(x, y)
//! u = fx * xd + cx,  v = fy * yd + cy
//! ```

use nalgebra::{Matrix2, Matrix3, Point2, Point3, Rotation3, SMatrix, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Derivative of a projected pixel w.r.t. `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
pub type CameraJacobian = SMatrix<f64, 2, 9>;
/// Derivative of a projected pixel w.r.t. `[ω, t]` of one view.
pub type PoseJacobian = SMatrix<f64, 2, 6>;

/// Zero-skew pinhole intrinsics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Row-major camera matrix.
    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Reads `fx, fy, cx, cy` from an upper-triangular `K` with `K[2][2] = 1`; skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx > 0.0
            && self.fy > 0.0
    }
}

/// Brown-Conrady radial (`k1, k2, k3`) and tangential (`p1, p2`) distortion
/// applied to normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady5 {
    /// Coefficients in serialized order `[k1, k2, p1, p2, k3]`.
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_coefficients(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn distort(&self, n: Point2<f64>) -> Point2<f64> {
        let (d, _, _) = self.distort_with_jacobians(n.x, n.y);
        Point2::new(d.x, d.y)
    }

    /// Distorted point, its derivative w.r.t. `(x, y)` and w.r.t. the
    /// coefficients in `[k1, k2, p1, p2, k3]` order.
    pub(crate) fn distort_with_jacobians(
        &self,
        x: f64,
        y: f64,
    ) -> (Vector2<f64>, Matrix2<f64>, SMatrix<f64, 2, 5>) {
        let Self { k1, k2, p1, p2, k3 } = *self;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
        let xy = x * y;

        let xd = x * radial + 2.0 * p1 * xy + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * xy;

        // d(radial)/d(r2)
        let dr = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;
        let d_point = Matrix2::new(
            radial + 2.0 * x * x * dr + 2.0 * p1 * y + 6.0 * p2 * x,
            2.0 * xy * dr + 2.0 * p1 * x + 2.0 * p2 * y,
            2.0 * xy * dr + 2.0 * p1 * x + 2.0 * p2 * y,
            radial + 2.0 * y * y * dr + 6.0 * p1 * y + 2.0 * p2 * x,
        );

        let d_coeffs = SMatrix::<f64, 2, 5>::from_row_slice(&[
            x * r2,
            x * r4,
            2.0 * xy,
            r2 + 2.0 * x * x,
            x * r6,
            y * r2,
            y * r4,
            r2 + 2.0 * y * y,
            2.0 * xy,
            y * r6,
        ]);

        (Vector2::new(xd, yd), d_point, d_coeffs)
    }
}

/// Board-to-camera transform of one accepted view.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl ViewPose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Pose from an axis-angle vector and translation.
    pub fn from_axis_angle(omega: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(omega), translation)
    }

    pub fn axis_angle(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }
}

/// Project a board point through `pose`, `intrinsics` and `distortion`.
pub fn project(
    intrinsics: &CameraIntrinsics,
    distortion: &BrownConrady5,
    pose: &ViewPose,
    p: &Point3<f64>,
) -> Point2<f64> {
    let pc = pose.transform(p);
    let n = distortion.distort(Point2::new(pc.x / pc.z, pc.y / pc.z));
    Point2::new(
        intrinsics.fx * n.x + intrinsics.cx,
        intrinsics.fy * n.y + intrinsics.cy,
    )
}

/// Projection of `p` with the rotation given as an axis-angle vector, plus
/// its derivatives w.r.t. the camera parameters and the view pose.
pub fn project_with_jacobians(
    intrinsics: &CameraIntrinsics,
    distortion: &BrownConrady5,
    omega: &Vector3<f64>,
    translation: &Vector3<f64>,
    p: &Point3<f64>,
) -> (Point2<f64>, CameraJacobian, PoseJacobian) {
    let rotation = Rotation3::new(*omega);
    let rx = rotation * p.coords;
    let pc = rx + translation;
    let inv_z = 1.0 / pc.z;
    let x = pc.x * inv_z;
    let y = pc.y * inv_z;

    let (d, d_point, d_coeffs) = distortion.distort_with_jacobians(x, y);
    let CameraIntrinsics { fx, fy, cx, cy } = *intrinsics;
    let pixel = Point2::new(fx * d.x + cx, fy * d.y + cy);

    let mut j_cam = CameraJacobian::zeros();
    j_cam[(0, 0)] = d.x;
    j_cam[(0, 2)] = 1.0;
    j_cam[(1, 1)] = d.y;
    j_cam[(1, 3)] = 1.0;
    for k in 0..5 {
        j_cam[(0, 4 + k)] = fx * d_coeffs[(0, k)];
        j_cam[(1, 4 + k)] = fy * d_coeffs[(1, k)];
    }

    let d_norm = SMatrix::<f64, 2, 3>::new(
        inv_z,
        0.0,
        -x * inv_z,
        0.0,
        inv_z,
        -y * inv_z,
    );
    let scale = Matrix2::new(fx, 0.0, 0.0, fy);
    let d_cam_point = scale * d_point * d_norm;

    // d(R X)/dω = -R [X]x J_r(ω)
    let d_rot = -(rotation.matrix() * skew(&p.coords) * so3_right_jacobian(omega));
    let mut j_pose = PoseJacobian::zeros();
    j_pose
        .fixed_view_mut::<2, 3>(0, 0)
        .copy_from(&(d_cam_point * d_rot));
    j_pose.fixed_view_mut::<2, 3>(0, 3).copy_from(&d_cam_point);

    (pixel, j_cam, j_pose)
}

pub(crate) fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Right Jacobian of the SO(3) exponential at `omega`.
pub(crate) fn so3_right_jacobian(omega: &Vector3<f64>) -> Matrix3<f64> {
    let theta2 = omega.norm_squared();
    let w = skew(omega);
    let w2 = w * w;
    if theta2 < 1e-10 {
        return Matrix3::identity() - 0.5 * w + w2 / 6.0;
    }
    let theta = theta2.sqrt();
    Matrix3::identity() - (1.0 - theta.cos()) / theta2 * w
        + (theta - theta.sin()) / (theta2 * theta) * w2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> (CameraIntrinsics, BrownConrady5) {
        (
            CameraIntrinsics {
                fx: 810.0,
                fy: 790.0,
                cx: 318.0,
                cy: 244.0,
            },
            BrownConrady5 {
                k1: -0.21,
                k2: 0.07,
                p1: 0.0012,
                p2: -0.0008,
                k3: 0.015,
            },
        )
    }

    #[test]
    fn zero_distortion_is_identity() {
        let n = Point2::new(0.3, -0.2);
        assert_eq!(BrownConrady5::default().distort(n), n);
    }

    #[test]
    fn coefficient_order_is_k1_k2_p1_p2_k3() {
        let (_, d) = camera();
        assert_eq!(d.coefficients(), [-0.21, 0.07, 0.0012, -0.0008, 0.015]);
        assert_eq!(BrownConrady5::from_coefficients(d.coefficients()), d);
    }

    #[test]
    fn project_matches_jacobian_variant() {
        let (k, d) = camera();
        let omega = Vector3::new(0.2, -0.3, 0.1);
        let t = Vector3::new(-2.0, 1.0, 18.0);
        let p = Point3::new(3.0, 2.0, 0.0);
        let (px, _, _) = project_with_jacobians(&k, &d, &omega, &t, &p);
        let direct = project(&k, &d, &ViewPose::from_axis_angle(omega, t), &p);
        assert_relative_eq!(px, direct, epsilon = 1e-9);
    }

    #[test]
    fn analytic_jacobians_match_finite_differences() {
        let (k, d) = camera();
        let omega = Vector3::new(0.25, -0.4, 0.15);
        let t = Vector3::new(-3.0, -1.5, 20.0);
        let p = Point3::new(4.0, 2.0, 0.0);
        let (_, j_cam, j_pose) = project_with_jacobians(&k, &d, &omega, &t, &p);

        let eval = |cam: [f64; 9], pose: [f64; 6]| {
            let k = CameraIntrinsics {
                fx: cam[0],
                fy: cam[1],
                cx: cam[2],
                cy: cam[3],
            };
            let d = BrownConrady5::from_coefficients([cam[4], cam[5], cam[6], cam[7], cam[8]]);
            let w = Vector3::new(pose[0], pose[1], pose[2]);
            let t = Vector3::new(pose[3], pose[4], pose[5]);
            project_with_jacobians(&k, &d, &w, &t, &p).0
        };
        let cam0 = [k.fx, k.fy, k.cx, k.cy, d.k1, d.k2, d.p1, d.p2, d.k3];
        let pose0 = [omega.x, omega.y, omega.z, t.x, t.y, t.z];
        let h = 1e-6;

        for i in 0..9 {
            let (mut plus, mut minus) = (cam0, cam0);
            plus[i] += h;
            minus[i] -= h;
            let num = (eval(plus, pose0) - eval(minus, pose0)) / (2.0 * h);
            assert_relative_eq!(j_cam[(0, i)], num.x, epsilon = 1e-4, max_relative = 1e-5);
            assert_relative_eq!(j_cam[(1, i)], num.y, epsilon = 1e-4, max_relative = 1e-5);
        }
        for i in 0..6 {
            let (mut plus, mut minus) = (pose0, pose0);
            plus[i] += h;
            minus[i] -= h;
            let num = (eval(cam0, plus) - eval(cam0, minus)) / (2.0 * h);
            assert_relative_eq!(j_pose[(0, i)], num.x, epsilon = 1e-4, max_relative = 1e-5);
            assert_relative_eq!(j_pose[(1, i)], num.y, epsilon = 1e-4, max_relative = 1e-5);
        }
    }

    #[test]
    fn right_jacobian_small_angle_is_continuous() {
        let tiny = Vector3::new(1e-6, -2e-6, 0.5e-6);
        let small = Vector3::new(1e-3, -2e-3, 0.5e-3);
        assert_relative_eq!(so3_right_jacobian(&tiny), Matrix3::identity(), epsilon = 1e-5);
        assert_relative_eq!(
            so3_right_jacobian(&small),
            Matrix3::identity() - 0.5 * skew(&small),
            epsilon = 1e-5
        );
    }
}
