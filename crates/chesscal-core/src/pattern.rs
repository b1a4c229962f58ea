use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("invalid pattern size {columns}x{rows}: need at least 2x2 inner corners")]
    InvalidPatternConfig { columns: u32, rows: u32 },
    #[error("invalid square size {0}: must be finite and positive")]
    InvalidSquareSize(f64),
}

fn default_square_size() -> f64 {
    1.0
}

/// Grid of inner corners of a planar chessboard.
///
/// `columns` counts inner corners along a row, `rows` along a column, so a
/// board with 8x5 squares has `columns = 7`, `rows = 4`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternGeometry {
    pub columns: u32,
    pub rows: u32,
    /// Distance between neighbouring inner corners, in object units.
    #[serde(default = "default_square_size")]
    pub square_size: f64,
}

impl Default for PatternGeometry {
    fn default() -> Self {
        Self {
            columns: 7,
            rows: 4,
            square_size: 1.0,
        }
    }
}

impl PatternGeometry {
    pub fn new(columns: u32, rows: u32) -> Result<Self, PatternError> {
        Self::with_square_size(columns, rows, 1.0)
    }

    pub fn with_square_size(columns: u32, rows: u32, square_size: f64) -> Result<Self, PatternError> {
        let pattern = Self {
            columns,
            rows,
            square_size,
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Re-check a geometry that was built field by field or deserialized.
    pub fn validate(&self) -> Result<(), PatternError> {
        if self.columns < 2 || self.rows < 2 {
            return Err(PatternError::InvalidPatternConfig {
                columns: self.columns,
                rows: self.rows,
            });
        }
        if !self.square_size.is_finite() || self.square_size <= 0.0 {
            return Err(PatternError::InvalidSquareSize(self.square_size));
        }
        Ok(())
    }

    /// Number of inner corners, `columns * rows`.
    pub fn corner_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Index of the corner at (`col`, `row`) in [`Self::object_points`].
    #[inline]
    pub fn index(&self, col: u32, row: u32) -> usize {
        row as usize * self.columns as usize + col as usize
    }

    /// Object-space corner positions `(col, row, 0) * square_size`, row-major.
    ///
    /// Detected corners are index-aligned with this sequence.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let s = self.square_size;
        let mut points = Vec::with_capacity(self.corner_count());
        for row in 0..self.rows {
            for col in 0..self.columns {
                points.push(Point3::new(col as f64 * s, row as f64 * s, 0.0));
            }
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major_and_planar() {
        let p = PatternGeometry::new(7, 4).expect("valid");
        let pts = p.object_points();
        assert_eq!(pts.len(), 28);
        assert_eq!(pts[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(pts[7], Point3::new(0.0, 1.0, 0.0));
        assert_eq!(pts[p.index(6, 3)], Point3::new(6.0, 3.0, 0.0));
        assert!(pts.iter().all(|q| q.z == 0.0));
    }

    #[test]
    fn square_size_scales_points() {
        let p = PatternGeometry::with_square_size(3, 2, 0.025).expect("valid");
        let pts = p.object_points();
        assert!((pts[5].x - 0.05).abs() < 1e-12);
        assert!((pts[5].y - 0.025).abs() < 1e-12);
    }

    #[test]
    fn degenerate_sizes_are_rejected() {
        for (c, r) in [(0, 4), (1, 4), (7, 1), (7, 0)] {
            assert_eq!(
                PatternGeometry::new(c, r),
                Err(PatternError::InvalidPatternConfig { columns: c, rows: r })
            );
        }
        assert!(PatternGeometry::with_square_size(7, 4, 0.0).is_err());
        assert!(PatternGeometry::with_square_size(7, 4, f64::NAN).is_err());
    }
}
