use chesscal_chessboard::chess::detect_corners;
use chesscal_chessboard::{ChessboardDetector, ChessboardParams, PatternDetector};
use chesscal_core::synthetic::{plane_homography, render_chessboard};
use chesscal_core::PatternGeometry;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{Matrix3, Rotation3, Vector3};

fn bench_detect(c: &mut Criterion) {
    let pattern = PatternGeometry::new(7, 4).expect("pattern");
    let k = Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0);
    let rotation = Rotation3::from_euler_angles(0.2, -0.15, 0.1);
    let translation = Vector3::new(0.0, 0.0, 22.0) - rotation * Vector3::new(3.0, 1.5, 0.0);
    let h = plane_homography(&k, &rotation, &translation);
    let img = render_chessboard(&pattern, &h, 640, 480);
    let detector = ChessboardDetector::new(pattern, ChessboardParams::default()).expect("detector");

    let mut group = c.benchmark_group("chessboard_640x480");
    group.bench_function("chess_candidates", |b| {
        b.iter(|| detect_corners(black_box(&img.view()), &detector.params().chess))
    });
    group.bench_function("detect", |b| b.iter(|| detector.detect(black_box(&img.view()))));
    group.finish();
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
