//! JSON run configuration and the end-to-end `calibrate` driver.

use std::fs;
use std::path::{Path, PathBuf};

use chesscal_chessboard::{ChessboardDetector, ChessboardParams};
use chesscal_core::{CorrespondenceSet, PatternGeometry};
use chesscal_solver::{solve, CalibrationResult, SolverParams};
use log::info;
use serde::{Deserialize, Serialize};

use crate::pipeline::{run, CancelToken, RunParams};
use crate::report::CalibrationReport;
use crate::source::open_source;
use crate::CalibrateError;

fn default_pattern_size() -> (u32, u32) {
    (7, 4)
}

fn default_square_size() -> f64 {
    1.0
}

fn default_framestep() -> usize {
    20
}

fn default_jobs() -> usize {
    1
}

/// Everything one calibration run needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrateConfig {
    /// Glob pattern of image files, or a `.gif` animation. Ignored with `load_corners`.
    #[serde(default)]
    pub input: String,
    /// Report path; `.json` selects JSON, anything else YAML.
    #[serde(default)]
    pub output: PathBuf,
    /// Inner corners `(columns, rows)`.
    #[serde(default = "default_pattern_size")]
    pub pattern_size: (u32, u32),
    #[serde(default = "default_square_size")]
    pub square_size: f64,
    /// Offer every n-th decoded frame of an animation.
    #[serde(default = "default_framestep")]
    pub framestep: usize,
    #[serde(default)]
    pub max_frames: Option<usize>,
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
    /// Save accepted correspondences here before solving.
    #[serde(default)]
    pub corners_path: Option<PathBuf>,
    /// Solve from a saved correspondence file instead of sampling.
    #[serde(default)]
    pub load_corners: Option<PathBuf>,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub detector: ChessboardParams,
    #[serde(default)]
    pub solver: SolverParams,
}

impl Default for CalibrateConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            output: PathBuf::from("calibration.yaml"),
            pattern_size: default_pattern_size(),
            square_size: default_square_size(),
            framestep: default_framestep(),
            max_frames: None,
            debug_dir: None,
            corners_path: None,
            load_corners: None,
            jobs: default_jobs(),
            detector: ChessboardParams::default(),
            solver: SolverParams::default(),
        }
    }
}

impl CalibrateConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrateError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CalibrateError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrateError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| CalibrateError::Output {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn pattern(&self) -> Result<PatternGeometry, CalibrateError> {
        let (columns, rows) = self.pattern_size;
        Ok(PatternGeometry::with_square_size(columns, rows, self.square_size)?)
    }

    pub fn run_params(&self) -> RunParams {
        RunParams {
            max_frames: self.max_frames,
            debug_dir: self.debug_dir.clone(),
            jobs: self.jobs,
        }
    }
}

/// Load the correspondence cache or sample the input, optionally save the
/// cache, solve, and write the report.
pub fn calibrate(
    config: &CalibrateConfig,
    cancel: &CancelToken,
) -> Result<CalibrationResult, CalibrateError> {
    let pattern = config.pattern()?;

    let set = match &config.load_corners {
        Some(path) => {
            let set = CorrespondenceSet::load_json(path)?;
            info!("loaded {} views from {}", set.count(), path.display());
            set
        }
        None => {
            let detector = ChessboardDetector::new(pattern, config.detector.clone())?;
            let mut source = open_source(&config.input, config.framestep)?;
            run(&mut source, &detector, &config.run_params(), cancel)?.set
        }
    };

    if let Some(path) = &config.corners_path {
        set.write_json(path)?;
        info!("saved correspondences to {}", path.display());
    }

    info!("calibrating...");
    let result = solve(&set, &config.solver)?;
    info!("RMS: {:.6}", result.rms);
    info!("camera matrix: {:?}", result.camera_matrix());
    info!("distortion coefficients: {:?}", result.dist_coefs());

    CalibrationReport::from(&result).write(&config.output)?;
    info!("wrote {}", config.output.display());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: CalibrateConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg.pattern_size, (7, 4));
        assert_eq!(cfg.square_size, 1.0);
        assert_eq!(cfg.framestep, 20);
        assert_eq!(cfg.max_frames, None);
        assert_eq!(cfg.jobs, 1);
        assert!(cfg.debug_dir.is_none() && cfg.corners_path.is_none() && cfg.load_corners.is_none());
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let cfg = CalibrateConfig {
            input: "frames/*.png".into(),
            pattern_size: (9, 6),
            max_frames: Some(25),
            jobs: 4,
            ..CalibrateConfig::default()
        };
        cfg.write_json(&path).expect("write");
        let loaded = CalibrateConfig::load_json(&path).expect("load");
        assert_eq!(loaded.input, cfg.input);
        assert_eq!(loaded.pattern_size, (9, 6));
        assert_eq!(loaded.max_frames, Some(25));
        assert_eq!(loaded.jobs, 4);
        assert_eq!(loaded.solver, cfg.solver);
    }

    #[test]
    fn degenerate_pattern_is_rejected_before_sampling() {
        let cfg = CalibrateConfig {
            input: "does-not-exist/*.png".into(),
            pattern_size: (1, 4),
            ..CalibrateConfig::default()
        };
        let err = calibrate(&cfg, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, CalibrateError::Pattern(_)), "{err}");
    }
}
