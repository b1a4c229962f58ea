//! Annotated copies of processed frames.

use std::path::{Path, PathBuf};

use chesscal_core::{DetectionResult, GrayImage, PatternGeometry};
use image::{Rgb, RgbImage};

use crate::CalibrateError;

const CORNER_RADIUS: i32 = 4;

/// Row colours, cycled.
const PALETTE: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 200, 0]),
    Rgb([0, 160, 255]),
    Rgb([160, 0, 255]),
];

/// `{dir}/{index:04}.png`.
pub fn debug_image_path(dir: &Path, frame_index: usize) -> PathBuf {
    dir.join(format!("{frame_index:04}.png"))
}

/// The frame as RGB with the found grid drawn over it: one polyline per
/// pattern row, a link from each row end to the next row start, and a circle
/// per corner. Misses are returned unannotated.
pub fn render_detection(
    frame: &GrayImage,
    pattern: &PatternGeometry,
    result: &DetectionResult,
) -> RgbImage {
    let mut out = RgbImage::from_fn(frame.width as u32, frame.height as u32, |x, y| {
        let v = frame.data[y as usize * frame.width + x as usize];
        Rgb([v, v, v])
    });
    if !result.found || result.corners.len() != pattern.corner_count() {
        return out;
    }

    let cols = pattern.columns as usize;
    let pixel = |k: usize| {
        let p = result.corners[k];
        (p.x.round() as i32, p.y.round() as i32)
    };
    for (row, corners) in result.corners.chunks(cols).enumerate() {
        let color = PALETTE[row % PALETTE.len()];
        let start = row * cols;
        for k in start..start + corners.len() {
            if k + 1 < result.corners.len() {
                draw_line_segment(&mut out, pixel(k), pixel(k + 1), color);
            }
            draw_circle(&mut out, pixel(k), CORNER_RADIUS, color);
        }
    }
    out
}

pub(crate) fn write_debug_image(
    dir: &Path,
    frame_index: usize,
    frame: &GrayImage,
    pattern: &PatternGeometry,
    result: &DetectionResult,
) -> Result<(), CalibrateError> {
    let path = debug_image_path(dir, frame_index);
    render_detection(frame, pattern, result)
        .save(&path)
        .map_err(|source| CalibrateError::DebugImage { path, source })
}

/// Bresenham line, clipped to the image.
fn draw_line_segment(img: &mut RgbImage, p1: (i32, i32), p2: (i32, i32), color: Rgb<u8>) {
    let (mut x0, mut y0) = p1;
    let (x1, y1) = p2;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Circle outline.
fn draw_circle(img: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let (cx, cy) = center;
    let outer = radius * radius;
    let inner = (radius - 1) * (radius - 1);
    for y in (cy - radius)..=(cy + radius) {
        for x in (cx - radius)..=(cx + radius) {
            let d = (x - cx).pow(2) + (y - cy).pow(2);
            if d <= outer && d > inner {
                put(img, x, y, color);
            }
        }
    }
}

fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}
