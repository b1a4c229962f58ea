//! Coarse X-junction candidates from the `chess-corners` ChESS detector.

use crate::params::ChessCornerParams;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use chesscal_core::{Corner, GrayImageView};
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

impl ChessCornerParams {
    /// Single-scale `chess-corners` configuration with these overrides applied.
    pub fn chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.threshold_rel = self.threshold_rel;
        cfg.params.nms_radius = self.nms_radius;
        if let Some(abs) = self.threshold_abs {
            cfg.params.threshold_abs = Some(abs);
        }
        if let Some(min) = self.min_cluster_size {
            cfg.params.min_cluster_size = min;
        }
        cfg
    }
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner {
        position: Point2::new(c.x, c.y),
        orientation: c.orientation,
        orientation_cluster: None,
        strength: c.response,
    }
}

/// Run the ChESS detector on `frame` and adapt its output into [`Corner`]s.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(frame, params), fields(width = frame.width, height = frame.height))
)]
pub fn detect_corners(frame: &GrayImageView<'_>, params: &ChessCornerParams) -> Vec<Corner> {
    let Some(img) =
        image::GrayImage::from_raw(frame.width as u32, frame.height as u32, frame.data.to_vec())
    else {
        debug!("frame buffer does not match {}x{}", frame.width, frame.height);
        return Vec::new();
    };
    let corners: Vec<Corner> = find_chess_corners_image(&img, &params.chess_config())
        .iter()
        .map(adapt_chess_corner)
        .collect();
    debug!("{} ChESS candidates", corners.len());
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use chesscal_core::synthetic::render_chessboard;
    use chesscal_core::{GrayImage, Homography, PatternGeometry};
    use nalgebra::Matrix3;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn fronto_board() -> (PatternGeometry, GrayImage) {
        let pattern = PatternGeometry::new(4, 3).expect("pattern");
        let h = Homography::new(Matrix3::new(30.0, 0.0, 80.0, 0.0, 30.0, 60.0, 0.0, 0.0, 1.0));
        (pattern, render_chessboard(&pattern, &h, 260, 200))
    }

    fn near(corners: &[Corner], x: f32, y: f32) -> Option<&Corner> {
        corners
            .iter()
            .find(|c| (c.position.x - x).abs() <= 1.5 && (c.position.y - y).abs() <= 1.5)
    }

    #[test]
    fn config_carries_overrides() {
        let params = ChessCornerParams {
            threshold_rel: 0.1,
            threshold_abs: Some(5.0),
            nms_radius: 3,
            min_cluster_size: Some(1),
        };
        let cfg = params.chess_config();
        assert_eq!(cfg.params.threshold_rel, 0.1);
        assert_eq!(cfg.params.threshold_abs, Some(5.0));
        assert_eq!(cfg.params.nms_radius, 3);
        assert_eq!(cfg.params.min_cluster_size, 1);
    }

    #[test]
    fn finds_every_inner_corner() {
        let (pattern, img) = fronto_board();
        let corners = detect_corners(&img.view(), &ChessCornerParams::default());
        assert!(corners.len() >= pattern.corner_count());
        for row in 0..3 {
            for col in 0..4 {
                let (x, y) = (80.0 + 30.0 * col as f32, 60.0 + 30.0 * row as f32);
                assert!(near(&corners, x, y).is_some(), "missing corner near ({x}, {y})");
            }
        }
    }

    #[test]
    fn neighbouring_orientations_are_orthogonal() {
        let (_, img) = fronto_board();
        let corners = detect_corners(&img.view(), &ChessCornerParams::default());
        let a = near(&corners, 80.0, 60.0).expect("corner").orientation;
        let b = near(&corners, 110.0, 60.0).expect("corner").orientation;
        let d = (a - b).rem_euclid(PI);
        assert!((d - FRAC_PI_2).abs() < 0.3, "a={a} b={b}");
    }

    #[test]
    fn flat_image_has_no_candidates() {
        let img = GrayImage::filled(64, 48, 128);
        assert!(detect_corners(&img.view(), &ChessCornerParams::default()).is_empty());
    }

    #[test]
    fn truncated_buffer_has_no_candidates() {
        let view = GrayImageView {
            width: 64,
            height: 48,
            data: &[0u8; 10],
        };
        assert!(detect_corners(&view, &ChessCornerParams::default()).is_empty());
    }
}
