//! Synthetic chessboard imagery for tests and benchmarks.
//!
//! Boards are rendered through a plane-to-image homography with 4x4
//! supersampling, so corners land at sub-pixel positions with realistic
//! anti-aliased edges.

use crate::{GrayImage, Homography, PatternGeometry};
use nalgebra::{Matrix3, Point2, Rotation3, Vector3};

const DARK: f64 = 30.0;
const LIGHT: f64 = 225.0;
const BACKGROUND: f64 = 140.0;
const SUPERSAMPLE: usize = 4;

/// Plane-to-image homography `K [r1 r2 t]` of a board posed at (`rotation`, `translation`).
pub fn plane_homography(
    k: &Matrix3<f64>,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> Homography {
    let r = rotation.matrix();
    let m = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), *translation]);
    let h = k * m;
    Homography::new(h / h[(2, 2)])
}

/// Board-plane intensity at `(x, y)` in object units.
///
/// The board has `(columns + 1) x (rows + 1)` squares with the inner corner
/// `(col, row)` at `(col, row) * square_size`, surrounded by a one-square
/// white margin. The top-left square is dark.
fn board_intensity(pattern: &PatternGeometry, x: f64, y: f64) -> f64 {
    let s = pattern.square_size;
    let sx = (x / s).floor() as i64;
    let sy = (y / s).floor() as i64;
    let cols = pattern.columns as i64;
    let rows = pattern.rows as i64;

    let inside = (-1..cols).contains(&sx) && (-1..rows).contains(&sy);
    if inside {
        if (sx + sy).rem_euclid(2) == 0 {
            DARK
        } else {
            LIGHT
        }
    } else if (-2..=cols).contains(&sx) && (-2..=rows).contains(&sy) {
        LIGHT
    } else {
        BACKGROUND
    }
}

/// Render `pattern` into a `width x height` frame through `h_board_to_image`.
///
/// Pixel `(x, y)` covers `[x - 0.5, x + 0.5]`, so a corner projected to
/// integer coordinates sits on a pixel centre.
pub fn render_chessboard(
    pattern: &PatternGeometry,
    h_board_to_image: &Homography,
    width: usize,
    height: usize,
) -> GrayImage {
    let Some(h_inv) = h_board_to_image.inverse() else {
        return GrayImage::filled(width, height, BACKGROUND as u8);
    };

    let step = 1.0 / SUPERSAMPLE as f64;
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for j in 0..SUPERSAMPLE {
                for i in 0..SUPERSAMPLE {
                    let px = x as f64 - 0.5 + (i as f64 + 0.5) * step;
                    let py = y as f64 - 0.5 + (j as f64 + 0.5) * step;
                    let b = h_inv.apply(Point2::new(px, py));
                    acc += board_intensity(pattern, b.x, b.y);
                }
            }
            let v = acc / (SUPERSAMPLE * SUPERSAMPLE) as f64;
            data.push(v.round().clamp(0.0, 255.0) as u8);
        }
    }

    GrayImage {
        width,
        height,
        data,
    }
}

/// Ground-truth image positions of the inner corners, row-major.
pub fn project_corners(pattern: &PatternGeometry, h_board_to_image: &Homography) -> Vec<Point2<f64>> {
    pattern
        .object_points()
        .iter()
        .map(|p| h_board_to_image.apply(Point2::new(p.x, p.y)))
        .collect()
}
