use chesscal_core::OrientationClusteringParams;
use serde::{Deserialize, Serialize};

/// Overrides for the `chess-corners` ChESS detector that produces the coarse
/// candidates. Unset options keep the crate's defaults.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessCornerParams {
    /// Keep responses above this fraction of the strongest one.
    pub threshold_rel: f32,
    pub threshold_abs: Option<f32>,
    /// Non-maximum suppression radius, in pixels.
    pub nms_radius: u32,
    pub min_cluster_size: Option<u32>,
}

impl Default for ChessCornerParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            threshold_abs: None,
            nms_radius: 2,
            min_cluster_size: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    /// Max angle between an edge and the local grid axis.
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 8.0,
            max_spacing_pix: 250.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Gradient-orthogonality sub-pixel refinement.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half-size of the search window; the window is `2 * win_radius + 1` wide.
    pub win_radius: usize,
    pub max_iters: usize,
    /// Stop once the corner moves less than this (pixels).
    pub eps: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            win_radius: 5,
            max_iters: 30,
            eps: 0.1,
        }
    }
}

/// Parameters of the chessboard detector.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    pub chess: ChessCornerParams,
    pub orientation_clustering: OrientationClusteringParams,
    pub graph: GridGraphParams,
    pub subpix: SubPixParams,
}
