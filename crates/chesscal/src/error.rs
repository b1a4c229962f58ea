use std::path::PathBuf;

use chesscal_chessboard::ChessboardError;
use chesscal_core::{PatternError, StoreError};
use chesscal_solver::SolverError;

use crate::source::SourceError;

/// Everything that can abort a calibration run.
#[derive(thiserror::Error, Debug)]
pub enum CalibrateError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Detector(#[from] ChessboardError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("failed to write debug image {path}: {source}")]
    DebugImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
