use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Candidate X-junction produced by the coarse corner response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Corner {
    /// Corner position in pixel coordinates.
    pub position: Point2<f32>,

    /// Direction of the bright diagonal through the corner, in radians.
    ///
    /// Defined modulo π because the diagonal is undirected. Neighbouring
    /// lattice corners have roughly orthogonal orientations, since the colours
    /// flip from one corner to the next.
    pub orientation: f32,

    /// Orientation cluster (0 or 1) assigned by [`crate::cluster_orientations`],
    /// `None` for outliers or before clustering.
    #[serde(default)]
    pub orientation_cluster: Option<usize>,

    /// Strength / response of the corner detector.
    pub strength: f32,
}

impl Corner {
    /// Convenience accessor for (x, y) as a vector.
    pub fn as_vec2(&self) -> Vector2<f32> {
        Vector2::new(self.position.x, self.position.y)
    }
}

/// Outcome of running a pattern detector on one frame.
///
/// `found == false` is the ordinary "pattern absent" outcome, not an error.
/// When `found` is true, `corners` has exactly `columns * rows` entries in the
/// row-major order of [`crate::PatternGeometry::object_points`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub found: bool,
    pub corners: Vec<Point2<f64>>,
}

impl DetectionResult {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn found(corners: Vec<Point2<f64>>) -> Self {
        Self {
            found: true,
            corners,
        }
    }
}
