//! Reprojection residuals over all views, packed for the LM solver.
//!
//! Full parameter layout: `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` followed by
//! `[ωx, ωy, ωz, tx, ty, tz]` per view. Fixed entries keep their value from
//! the packing point and are dropped from the solver's vector.

use crate::camera::{project_with_jacobians, BrownConrady5, CameraIntrinsics, ViewPose};
use chesscal_core::ViewObservation;
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;

pub(crate) const CAMERA_PARAMS: usize = 9;
pub(crate) const POSE_PARAMS: usize = 6;

const K1: usize = 4;
const K2: usize = 5;
const P1: usize = 6;
const P2: usize = 7;
const K3: usize = 8;

/// Which camera parameters the refinement may change.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FreeMask {
    pub fix_k3: bool,
    pub fix_tangential: bool,
}

pub(crate) struct CalibrationProblem<'a> {
    views: &'a [ViewObservation],
    base: DVector<f64>,
    /// Solver column of every full parameter, `None` when fixed.
    column: Vec<Option<usize>>,
    free: Vec<usize>,
    num_residuals: usize,
}

impl<'a> CalibrationProblem<'a> {
    pub fn new(
        views: &'a [ViewObservation],
        intrinsics: &CameraIntrinsics,
        distortion: &BrownConrady5,
        poses: &[ViewPose],
        mask: FreeMask,
    ) -> Self {
        let base = pack(intrinsics, distortion, poses);
        let fixed = |i: usize| {
            (mask.fix_tangential && (i == P1 || i == P2)) || (mask.fix_k3 && i == K3)
        };
        let free: Vec<usize> = (0..base.len()).filter(|&i| !fixed(i)).collect();
        let mut column = vec![None; base.len()];
        for (c, &i) in free.iter().enumerate() {
            column[i] = Some(c);
        }
        let num_residuals = 2 * views.iter().map(|v| v.len()).sum::<usize>();
        Self {
            views,
            base,
            column,
            free,
            num_residuals,
        }
    }

    /// Solver vector at the packing point.
    pub fn initial_point(&self) -> DVector<f64> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| self.base[i]))
    }

    /// Full parameter vector for a solver vector.
    pub fn expand(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut full = self.base.clone();
        for (c, &i) in self.free.iter().enumerate() {
            full[i] = x[c];
        }
        full
    }

    pub fn unpack(&self, x: &DVector<f64>) -> (CameraIntrinsics, BrownConrady5, Vec<ViewPose>) {
        unpack(&self.expand(x), self.views.len())
    }

    /// Residual and Jacobian blocks of every view, computed in parallel.
    fn view_blocks(&self, full: &DVector<f64>, with_jacobian: bool) -> Vec<ViewBlock> {
        let (intrinsics, distortion) = unpack_camera(full);
        self.views
            .par_iter()
            .enumerate()
            .map(|(v, view)| {
                let o = CAMERA_PARAMS + POSE_PARAMS * v;
                let omega = Vector3::new(full[o], full[o + 1], full[o + 2]);
                let t = Vector3::new(full[o + 3], full[o + 4], full[o + 5]);
                let n = view.len();
                let mut block = ViewBlock {
                    residuals: DVector::zeros(2 * n),
                    camera: with_jacobian.then(|| DMatrix::zeros(2 * n, CAMERA_PARAMS)),
                    pose: with_jacobian.then(|| DMatrix::zeros(2 * n, POSE_PARAMS)),
                };
                for (k, (obj, img)) in view.object_points().iter().zip(view.image_points()).enumerate() {
                    let (px, j_cam, j_pose) =
                        project_with_jacobians(&intrinsics, &distortion, &omega, &t, obj);
                    block.residuals[2 * k] = px.x - img.x;
                    block.residuals[2 * k + 1] = px.y - img.y;
                    if let Some(cam) = block.camera.as_mut() {
                        cam.fixed_view_mut::<2, CAMERA_PARAMS>(2 * k, 0).copy_from(&j_cam);
                    }
                    if let Some(pose) = block.pose.as_mut() {
                        pose.fixed_view_mut::<2, POSE_PARAMS>(2 * k, 0).copy_from(&j_pose);
                    }
                }
                block
            })
            .collect()
    }

    fn assemble(&self, blocks: Vec<ViewBlock>) -> (DVector<f64>, DMatrix<f64>) {
        let mut r = DVector::zeros(self.num_residuals);
        let mut j = DMatrix::zeros(self.num_residuals, self.free.len());
        let mut row = 0;
        for (v, block) in blocks.into_iter().enumerate() {
            let rows = block.residuals.len();
            r.rows_mut(row, rows).copy_from(&block.residuals);
            if let Some(cam) = &block.camera {
                for p in 0..CAMERA_PARAMS {
                    if let Some(c) = self.column[p] {
                        j.view_mut((row, c), (rows, 1)).copy_from(&cam.column(p));
                    }
                }
            }
            if let Some(pose) = &block.pose {
                let o = CAMERA_PARAMS + POSE_PARAMS * v;
                for p in 0..POSE_PARAMS {
                    if let Some(c) = self.column[o + p] {
                        j.view_mut((row, c), (rows, 1)).copy_from(&pose.column(p));
                    }
                }
            }
            row += rows;
        }
        (r, j)
    }
}

struct ViewBlock {
    residuals: DVector<f64>,
    camera: Option<DMatrix<f64>>,
    pose: Option<DMatrix<f64>>,
}

impl crate::lm::NllsProblem for CalibrationProblem<'_> {
    fn num_params(&self) -> usize {
        self.free.len()
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let blocks = self.view_blocks(&self.expand(x), false);
        let mut r = DVector::zeros(self.num_residuals);
        let mut row = 0;
        for block in blocks {
            let rows = block.residuals.len();
            r.rows_mut(row, rows).copy_from(&block.residuals);
            row += rows;
        }
        r
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        self.residuals_and_jacobian(x).1
    }

    fn residuals_and_jacobian(&self, x: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
        self.assemble(self.view_blocks(&self.expand(x), true))
    }
}

fn pack(intrinsics: &CameraIntrinsics, distortion: &BrownConrady5, poses: &[ViewPose]) -> DVector<f64> {
    let mut x = DVector::zeros(CAMERA_PARAMS + POSE_PARAMS * poses.len());
    x[0] = intrinsics.fx;
    x[1] = intrinsics.fy;
    x[2] = intrinsics.cx;
    x[3] = intrinsics.cy;
    for (i, c) in distortion.coefficients().into_iter().enumerate() {
        x[K1 + i] = c;
    }
    for (v, pose) in poses.iter().enumerate() {
        let o = CAMERA_PARAMS + POSE_PARAMS * v;
        x.fixed_rows_mut::<3>(o).copy_from(&pose.axis_angle());
        x.fixed_rows_mut::<3>(o + 3).copy_from(&pose.translation);
    }
    x
}

fn unpack_camera(full: &DVector<f64>) -> (CameraIntrinsics, BrownConrady5) {
    (
        CameraIntrinsics {
            fx: full[0],
            fy: full[1],
            cx: full[2],
            cy: full[3],
        },
        BrownConrady5::from_coefficients([full[K1], full[K2], full[P1], full[P2], full[K3]]),
    )
}

fn unpack(full: &DVector<f64>, views: usize) -> (CameraIntrinsics, BrownConrady5, Vec<ViewPose>) {
    let (intrinsics, distortion) = unpack_camera(full);
    let poses = (0..views)
        .map(|v| {
            let o = CAMERA_PARAMS + POSE_PARAMS * v;
            ViewPose::from_axis_angle(
                full.fixed_rows::<3>(o).into_owned(),
                full.fixed_rows::<3>(o + 3).into_owned(),
            )
        })
        .collect();
    (intrinsics, distortion, poses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::NllsProblem;
    use approx::assert_relative_eq;
    use chesscal_core::PatternGeometry;
    use nalgebra::{Point2, Rotation3};

    fn setup() -> (Vec<ViewObservation>, CameraIntrinsics, BrownConrady5, Vec<ViewPose>) {
        let k = CameraIntrinsics {
            fx: 800.0,
            fy: 800.0,
            cx: 320.0,
            cy: 240.0,
        };
        let d = BrownConrady5 {
            k1: -0.1,
            k2: 0.02,
            p1: 0.001,
            p2: -0.002,
            k3: 0.003,
        };
        let poses = vec![
            ViewPose::new(Rotation3::from_euler_angles(0.2, -0.1, 0.05), Vector3::new(-3.0, -1.5, 20.0)),
            ViewPose::new(Rotation3::from_euler_angles(-0.3, 0.2, -0.1), Vector3::new(-2.0, -1.0, 18.0)),
        ];
        let object = PatternGeometry::new(4, 3).expect("pattern").object_points();
        let views = poses
            .iter()
            .enumerate()
            .map(|(i, pose)| {
                // Observations deliberately off by a pixel so residuals are non-zero.
                let image = object
                    .iter()
                    .map(|p| crate::camera::project(&k, &d, pose, p) + nalgebra::Vector2::new(1.0, -0.5))
                    .collect::<Vec<Point2<f64>>>();
                ViewObservation::new(i, object.clone(), image).expect("view")
            })
            .collect();
        (views, k, d, poses)
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let (views, k, d, poses) = setup();
        let problem = CalibrationProblem::new(
            &views,
            &k,
            &d,
            &poses,
            FreeMask {
                fix_k3: false,
                fix_tangential: false,
            },
        );
        let (k2, d2, poses2) = problem.unpack(&problem.initial_point());
        assert_eq!(k2, k);
        assert_relative_eq!(d2.k3, d.k3);
        for (a, b) in poses2.iter().zip(&poses) {
            assert_relative_eq!(a.rotation, b.rotation, epsilon = 1e-12);
            assert_relative_eq!(a.translation, b.translation);
        }
        let r = problem.residuals(&problem.initial_point());
        assert_eq!(r.len(), problem.num_residuals());
        assert_relative_eq!(r[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(r[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn fixed_terms_leave_the_solver_vector() {
        let (views, k, d, poses) = setup();
        let mask = FreeMask {
            fix_k3: true,
            fix_tangential: true,
        };
        let problem = CalibrationProblem::new(&views, &k, &d, &poses, mask);
        assert_eq!(problem.num_params(), CAMERA_PARAMS - 3 + 2 * POSE_PARAMS);
        let mut x = problem.initial_point();
        x[5] += 0.5; // k2
        let (_, d2, _) = problem.unpack(&x);
        assert_eq!((d2.p1, d2.p2, d2.k3), (d.p1, d.p2, d.k3));
        assert_relative_eq!(d2.k2, d.k2 + 0.5);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let (views, k, d, poses) = setup();
        let problem = CalibrationProblem::new(
            &views,
            &k,
            &d,
            &poses,
            FreeMask {
                fix_k3: false,
                fix_tangential: false,
            },
        );
        let x0 = problem.initial_point();
        let (_, j) = problem.residuals_and_jacobian(&x0);
        for c in 0..problem.num_params() {
            let h = 1e-6 * x0[c].abs().max(1.0);
            let mut plus = x0.clone();
            let mut minus = x0.clone();
            plus[c] += h;
            minus[c] -= h;
            let num = (problem.residuals(&plus) - problem.residuals(&minus)) / (2.0 * h);
            for r in 0..problem.num_residuals() {
                assert_relative_eq!(j[(r, c)], num[r], epsilon = 1e-4, max_relative = 1e-4);
            }
        }
    }
}
