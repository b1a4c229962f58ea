//! Calibration report document.

use std::fs;
use std::path::{Path, PathBuf};

use chesscal_solver::CalibrationResult;
use serde::{Deserialize, Serialize};

use crate::CalibrateError;

/// What is written to the output file.
///
/// `rms`, `camera_matrix` (row-major 3x3) and `dist_coefs` (`[k1, k2, p1, p2, k3]`)
/// are always present; `image_size` and `views` are informational.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub rms: f64,
    pub camera_matrix: [[f64; 3]; 3],
    pub dist_coefs: [f64; 5],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<[usize; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<usize>,
}

impl From<&CalibrationResult> for CalibrationReport {
    fn from(result: &CalibrationResult) -> Self {
        Self {
            rms: result.rms,
            camera_matrix: result.camera_matrix(),
            dist_coefs: result.dist_coefs(),
            image_size: Some([result.image_size.0, result.image_size.1]),
            views: Some(result.poses.len()),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl CalibrationReport {
    /// YAML text, or pretty JSON when `path` ends in `.json`.
    pub fn to_string_for(&self, path: &Path) -> Result<String, CalibrateError> {
        if is_json(path) {
            Ok(serde_json::to_string_pretty(self)?)
        } else {
            Ok(serde_yaml::to_string(self)?)
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), CalibrateError> {
        let path = path.as_ref();
        let text = self.to_string_for(path)?;
        fs::write(path, text).map_err(|source| CalibrateError::Output {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrateError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CalibrateError::Input {
            path: PathBuf::from(path),
            source,
        })?;
        if is_json(path) {
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(serde_yaml::from_str(&text)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> CalibrationReport {
        CalibrationReport {
            rms: 0.25,
            camera_matrix: [[800.0, 0.0, 320.0], [0.0, 790.0, 240.0], [0.0, 0.0, 1.0]],
            dist_coefs: [-0.2, 0.05, 0.001, -0.002, 0.0],
            image_size: Some([640, 480]),
            views: Some(12),
        }
    }

    #[test]
    fn yaml_has_required_keys() {
        let text = report().to_string_for(Path::new("out.yaml")).expect("yaml");
        let value: serde_yaml::Value = serde_yaml::from_str(&text).expect("parse");
        assert_eq!(value["rms"].as_f64(), Some(0.25));
        assert_eq!(value["camera_matrix"][1][1].as_f64(), Some(790.0));
        assert_eq!(value["dist_coefs"].as_sequence().map(Vec::len), Some(5));
        assert_eq!(value["dist_coefs"][0].as_f64(), Some(-0.2));
    }

    #[test]
    fn json_extension_selects_json() {
        let text = report().to_string_for(Path::new("calib.JSON")).expect("json");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse");
        assert_eq!(value["camera_matrix"][0], serde_json::json!([800.0, 0.0, 320.0]));
        assert_eq!(value["views"], 12);
    }

    #[test]
    fn minimal_document_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("minimal.yaml");
        fs::write(
            &path,
            "rms: 0.5\ncamera_matrix: [[1, 0, 2], [0, 1, 3], [0, 0, 1]]\ndist_coefs: [0, 0, 0, 0, 0]\n",
        )
        .expect("write");
        let loaded = CalibrationReport::load(&path).expect("load");
        assert_eq!(loaded.rms, 0.5);
        assert_eq!(loaded.image_size, None);

        let out = dir.path().join("round.yaml");
        report().write(&out).expect("write");
        assert_eq!(CalibrationReport::load(&out).expect("load"), report());
    }
}
