use crate::camera::{project, BrownConrady5, CameraIntrinsics, ViewPose};
use crate::lm::{levenberg_marquardt, SolveOptions, SolveReport, Termination};
use crate::planar_pose::pose_from_homography;
use crate::problem::{CalibrationProblem, FreeMask};
use crate::zhang::initial_intrinsics;
use chesscal_core::{estimate_homography, CorrespondenceSet, ViewObservation};
use log::{debug, info};
use nalgebra::{Matrix3, Point2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fewest views the closed-form initialization can work with.
pub const MIN_VIEWS: usize = 3;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("need at least {required} views to calibrate, have {count}")]
    InsufficientViews { count: usize, required: usize },
    #[error("homography estimation failed for frame {view}")]
    HomographyFailed { view: usize },
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Keep `k3` at zero.
    pub fix_k3: bool,
    /// Keep `p1, p2` at zero.
    pub fix_tangential: bool,
    pub lm: SolveOptions,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            fix_k3: false,
            fix_tangential: false,
            lm: SolveOptions::default(),
        }
    }
}

/// Refined camera model, one pose per input view, and fit quality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// RMS reprojection error in pixels over all observations.
    pub rms: f64,
    pub intrinsics: CameraIntrinsics,
    pub distortion: BrownConrady5,
    pub poses: Vec<ViewPose>,
    pub per_view_rms: Vec<f64>,
    pub image_size: (usize, usize),
    pub report: SolveReport,
}

impl CalibrationResult {
    pub fn camera_matrix(&self) -> [[f64; 3]; 3] {
        self.intrinsics.to_rows()
    }

    /// Distortion coefficients as `[k1, k2, p1, p2, k3]`.
    pub fn dist_coefs(&self) -> [f64; 5] {
        self.distortion.coefficients()
    }
}

/// Closed-form starting point: intrinsics from the view homographies, one
/// pose per view, zero distortion.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(set), fields(views = set.count())))]
pub fn initial_estimate(set: &CorrespondenceSet) -> Result<(CameraIntrinsics, Vec<ViewPose>), SolverError> {
    check_view_count(set)?;
    let image_size = set
        .image_size()
        .ok_or_else(|| SolverError::InitializationFailed("image size unknown".into()))?;

    let homographies = set
        .views()
        .par_iter()
        .map(|view| view_homography(view).ok_or(SolverError::HomographyFailed { view: view.frame_index() }))
        .collect::<Result<Vec<_>, _>>()?;

    let intrinsics = initial_intrinsics(&homographies, image_size).ok_or_else(|| {
        SolverError::InitializationFailed("no finite positive focal length from homographies".into())
    })?;
    debug!(
        "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
    );

    let k = intrinsics.matrix();
    let poses = set
        .views()
        .iter()
        .zip(&homographies)
        .map(|(view, h)| {
            pose_from_homography(&k, h).ok_or_else(|| {
                SolverError::InitializationFailed(format!(
                    "pose decomposition failed for frame {}",
                    view.frame_index()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((intrinsics, poses))
}

/// Calibrate from all accepted views.
///
/// Fails only when initialization is impossible; an iteration cap or a stalled
/// refinement still returns the best estimate, with its RMS as the quality signal.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(set, params), fields(views = set.count(), points = set.total_points()))
)]
pub fn solve(set: &CorrespondenceSet, params: &SolverParams) -> Result<CalibrationResult, SolverError> {
    let (intrinsics, poses) = initial_estimate(set)?;
    let image_size = set
        .image_size()
        .ok_or_else(|| SolverError::InitializationFailed("image size unknown".into()))?;

    let problem = CalibrationProblem::new(
        set.views(),
        &intrinsics,
        &BrownConrady5::default(),
        &poses,
        FreeMask {
            fix_k3: params.fix_k3,
            fix_tangential: params.fix_tangential,
        },
    );
    let (x, report) = levenberg_marquardt(&problem, problem.initial_point(), &params.lm);
    if report.termination == Termination::NonFinite && !report.initial_cost.is_finite() {
        return Err(SolverError::InitializationFailed(
            "reprojection residuals of the initial estimate are not finite".into(),
        ));
    }
    let (intrinsics, distortion, poses) = problem.unpack(&x);

    let per_view_rms = per_view_rms(set.views(), &intrinsics, &distortion, &poses);
    let rms = rms_from_cost(report.final_cost, set.total_points());
    info!(
        "calibrated {} views: rms {rms:.4} px after {} evaluations ({:?})",
        set.count(),
        report.evaluations,
        report.termination
    );

    Ok(CalibrationResult {
        rms,
        intrinsics,
        distortion,
        poses,
        per_view_rms,
        image_size,
        report,
    })
}

/// RMS reprojection error of a camera model over `views`.
pub fn reprojection_rms(
    views: &[ViewObservation],
    intrinsics: &CameraIntrinsics,
    distortion: &BrownConrady5,
    poses: &[ViewPose],
) -> f64 {
    let (sum, n) = views
        .iter()
        .zip(poses)
        .map(|(view, pose)| (squared_error(view, intrinsics, distortion, pose), view.len()))
        .fold((0.0, 0), |(s, n), (e, k)| (s + e, n + k));
    rms_from_cost(sum, n)
}

fn per_view_rms(
    views: &[ViewObservation],
    intrinsics: &CameraIntrinsics,
    distortion: &BrownConrady5,
    poses: &[ViewPose],
) -> Vec<f64> {
    views
        .iter()
        .zip(poses)
        .map(|(view, pose)| rms_from_cost(squared_error(view, intrinsics, distortion, pose), view.len()))
        .collect()
}

fn squared_error(
    view: &ViewObservation,
    intrinsics: &CameraIntrinsics,
    distortion: &BrownConrady5,
    pose: &ViewPose,
) -> f64 {
    view.object_points()
        .iter()
        .zip(view.image_points())
        .map(|(obj, img)| (project(intrinsics, distortion, pose, obj) - img).norm_squared())
        .sum()
}

fn rms_from_cost(cost: f64, points: usize) -> f64 {
    if points == 0 {
        return 0.0;
    }
    (cost / points as f64).sqrt()
}

fn check_view_count(set: &CorrespondenceSet) -> Result<(), SolverError> {
    if set.count() < MIN_VIEWS {
        return Err(SolverError::InsufficientViews {
            count: set.count(),
            required: MIN_VIEWS,
        });
    }
    Ok(())
}

fn view_homography(view: &ViewObservation) -> Option<Matrix3<f64>> {
    let board: Vec<Point2<f64>> = view
        .object_points()
        .iter()
        .map(|p| Point2::new(p.x, p.y))
        .collect();
    estimate_homography(&board, view.image_points()).map(|h| h.h)
}
