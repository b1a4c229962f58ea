//! Camera calibration from chessboard image sequences and animations.
//!
//! This is the facade crate of the `chesscal-*` workspace. It wires the
//! pieces together:
//! - [`source`]: frames from a glob of image files, a GIF animation or (with
//!   the `ffmpeg` feature) a video file, sampled every `framestep` frames,
//! - [`pipeline::run`]: detection over the frames, accumulating 2D-3D
//!   correspondences until the source runs dry or `max_frames` views are
//!   accepted,
//! - [`solve`](chesscal_solver::solve): Zhang initialisation plus
//!   Levenberg-Marquardt refinement of the pinhole + Brown-Conrady model,
//! - [`CalibrationReport`]: the YAML (or JSON) result document.
//!
//! ## Quickstart
//!
//! ```no_run
//! use chesscal::{calibrate, CalibrateConfig, CancelToken};
//!
//! # fn main() -> Result<(), chesscal::CalibrateError> {
//! let config = CalibrateConfig {
//!     input: "frames/*.png".into(),
//!     output: "camera.yaml".into(),
//!     pattern_size: (9, 6),
//!     max_frames: Some(30),
//!     ..CalibrateConfig::default()
//! };
//! let result = calibrate(&config, &CancelToken::new())?;
//! println!("rms = {:.4}", result.rms);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `chesscal::core`: pattern model, frames, correspondences, homographies.
//! - `chesscal::chessboard`: the inner-corner detector.
//! - `chesscal::solver`: camera model, initialisation and refinement.

mod config;
pub mod debug_draw;
mod error;
pub mod pipeline;
mod report;
pub mod source;

pub use chesscal_chessboard as chessboard;
pub use chesscal_core as core;
pub use chesscal_solver as solver;

pub use chesscal_chessboard::{ChessboardDetector, ChessboardParams, PatternDetector};
pub use chesscal_core::{CorrespondenceSet, DetectionResult, GrayImage, PatternGeometry};
pub use chesscal_solver::{CalibrationResult, SolverParams};

pub use config::{calibrate, CalibrateConfig};
pub use error::CalibrateError;
pub use pipeline::{run, CancelToken, RunParams, RunSummary, StopReason};
pub use report::CalibrationReport;
pub use source::{open_source, FrameSource, SourceError};
