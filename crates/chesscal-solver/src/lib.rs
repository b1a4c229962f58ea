//! Planar camera calibration from chessboard correspondences.
//!
//! [`solve`] runs in two stages:
//! 1. closed-form initialization: one homography per view, Zhang's zero-skew
//!    intrinsics ([`zhang`]), and a pose per view ([`pose_from_homography`]);
//! 2. Levenberg-Marquardt refinement ([`levenberg_marquardt`]) of intrinsics,
//!    Brown-Conrady distortion and all poses against the pixel reprojection
//!    residuals, with an analytic Jacobian assembled per view in parallel.

mod calibrate;
pub mod camera;
pub mod lm;
mod planar_pose;
mod problem;
pub mod zhang;

pub use calibrate::{
    initial_estimate, reprojection_rms, solve, CalibrationResult, SolverError, SolverParams, MIN_VIEWS,
};
pub use camera::{project, BrownConrady5, CameraIntrinsics, ViewPose};
pub use lm::{levenberg_marquardt, NllsProblem, SolveOptions, SolveReport, Termination};
pub use planar_pose::pose_from_homography;
