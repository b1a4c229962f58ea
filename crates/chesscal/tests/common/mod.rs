//! Rendered chessboard frames written to disk.

#![allow(dead_code)]

use std::path::Path;

use chesscal::core::synthetic::{plane_homography, render_chessboard};
use chesscal::PatternGeometry;
use nalgebra::{Matrix3, Rotation3, Vector3};

pub const WIDTH: usize = 640;
pub const HEIGHT: usize = 480;
pub const FX: f64 = 800.0;

/// Board orientations (roll, pitch, yaw).
pub const TILTS: [(f64, f64, f64); 6] = [
    (0.25, -0.1, 0.05),
    (-0.2, 0.3, -0.1),
    (0.1, 0.25, 0.2),
    (-0.3, -0.2, 0.0),
    (0.3, 0.15, -0.15),
    (0.0, -0.3, 0.1),
];

pub fn pattern() -> PatternGeometry {
    PatternGeometry::new(7, 4).expect("pattern")
}

/// Write one PNG per tilt as `frame_{i:02}.png`, then a blank
/// `frame_{TILTS.len():02}.png`; returns the glob matching them.
pub fn write_frames(dir: &Path, pattern: &PatternGeometry) -> String {
    let k = Matrix3::new(FX, 0.0, 320.0, 0.0, FX, 240.0, 0.0, 0.0, 1.0);
    let centre = Vector3::new(
        (pattern.columns - 1) as f64 / 2.0,
        (pattern.rows - 1) as f64 / 2.0,
        0.0,
    );
    for (i, (roll, pitch, yaw)) in TILTS.iter().enumerate() {
        let rotation = Rotation3::from_euler_angles(*roll, *pitch, *yaw);
        let translation = Vector3::new(0.0, 0.0, 22.0) - rotation * centre;
        let h = plane_homography(&k, &rotation, &translation);
        let frame = render_chessboard(pattern, &h, WIDTH, HEIGHT);
        image::GrayImage::from_raw(WIDTH as u32, HEIGHT as u32, frame.data)
            .expect("buffer")
            .save(dir.join(format!("frame_{i:02}.png")))
            .expect("save");
    }
    image::GrayImage::from_pixel(WIDTH as u32, HEIGHT as u32, image::Luma([128]))
        .save(dir.join(format!("frame_{:02}.png", TILTS.len())))
        .expect("save");
    format!("{}/frame_*.png", dir.display())
}
