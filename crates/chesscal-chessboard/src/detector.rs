use crate::chess::detect_corners;
use crate::gridgraph::{connected_components, GridAxes, GridGraph};
use crate::lattice::{assign_grid_coordinates, canonical_order};
use crate::params::ChessboardParams;
use crate::subpix::refine_corners;
use chesscal_core::{cluster_orientations, DetectionResult, GrayImageView, PatternGeometry};
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ChessboardError {
    #[error(transparent)]
    Pattern(#[from] chesscal_core::PatternError),
    #[error("invalid detector parameters: {0}")]
    InvalidParams(String),
}

/// Anything that turns a frame into a [`DetectionResult`] for a fixed pattern.
///
/// Implementations must be deterministic: the same frame always yields the
/// same result.
pub trait PatternDetector: Sync {
    fn pattern(&self) -> &PatternGeometry;

    fn detect(&self, frame: &GrayImageView<'_>) -> DetectionResult;
}

/// Chessboard inner-corner detector for one [`PatternGeometry`].
#[derive(Clone, Debug)]
pub struct ChessboardDetector {
    pattern: PatternGeometry,
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(pattern: PatternGeometry, params: ChessboardParams) -> Result<Self, ChessboardError> {
        pattern.validate()?;
        if !(params.chess.threshold_rel >= 0.0 && params.chess.threshold_rel <= 1.0) {
            return Err(ChessboardError::InvalidParams(format!(
                "ChESS relative threshold {} outside [0, 1]",
                params.chess.threshold_rel
            )));
        }
        if params.subpix.win_radius == 0 {
            return Err(ChessboardError::InvalidParams("sub-pixel window radius is 0".into()));
        }
        if params.graph.min_spacing_pix > params.graph.max_spacing_pix {
            return Err(ChessboardError::InvalidParams(format!(
                "spacing window [{}, {}] is empty",
                params.graph.min_spacing_pix, params.graph.max_spacing_pix
            )));
        }
        Ok(Self { pattern, params })
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Coarse lattice corners in pattern order, before sub-pixel refinement.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn detect_coarse(&self, frame: &GrayImageView<'_>) -> Option<Vec<Point2<f64>>> {
        let expected = self.pattern.corner_count();
        let mut corners = detect_corners(frame, &self.params.chess);
        if corners.len() < expected {
            debug!("{} candidates, need {expected}", corners.len());
            return None;
        }

        let clusters = cluster_orientations(&corners, &self.params.orientation_clustering)?;
        for (c, label) in corners.iter_mut().zip(&clusters.labels) {
            c.orientation_cluster = *label;
        }
        let axes = GridAxes::from_diagonals(clusters.centers)?;
        let graph = GridGraph::new(&corners, &self.params.graph, &axes);

        let mut matches = connected_components(&graph)
            .into_iter()
            .filter(|comp| comp.len() == expected)
            .filter_map(|comp| assign_grid_coordinates(&graph, &comp))
            .filter(|lattice| lattice.matches(&self.pattern));

        let lattice = matches.next()?;
        if matches.next().is_some() {
            debug!("more than one complete {}x{} grid", self.pattern.columns, self.pattern.rows);
            return None;
        }

        let order = canonical_order(&lattice, &corners, &self.pattern)?;
        Some(
            order
                .into_iter()
                .map(|k| {
                    let p = corners[k].position;
                    Point2::new(p.x as f64, p.y as f64)
                })
                .collect(),
        )
    }
}

impl PatternDetector for ChessboardDetector {
    fn pattern(&self) -> &PatternGeometry {
        &self.pattern
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    fn detect(&self, frame: &GrayImageView<'_>) -> DetectionResult {
        match self.detect_coarse(frame) {
            Some(coarse) => DetectionResult::found(refine_corners(frame, &coarse, &self.params.subpix)),
            None => DetectionResult::not_found(),
        }
    }
}
