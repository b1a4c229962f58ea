use chesscal_core::{
    CorrespondenceFile, CorrespondenceSet, CorrespondenceStore, PatternGeometry, StoreError,
};
use nalgebra::Point2;

fn store_with_views(n: usize) -> CorrespondenceStore {
    let pattern = PatternGeometry::new(4, 3).expect("pattern");
    let mut store = CorrespondenceStore::new();
    for v in 0..n {
        let shift = 7.5 * v as f64;
        let img = pattern
            .object_points()
            .iter()
            .map(|p| Point2::new(100.0 + 31.25 * p.x + shift, 50.0 + 29.5 * p.y - shift))
            .collect();
        store
            .accept(v * 20, pattern.object_points(), img, 640, 480)
            .expect("accept");
    }
    store
}

#[test]
fn json_cache_round_trips_exactly() {
    let set = store_with_views(3).finish();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("corners.json");

    set.write_json(&path).expect("write");
    let loaded = CorrespondenceSet::load_json(&path).expect("load");

    assert_eq!(loaded, set);
    assert_eq!(loaded.image_size(), Some((640, 480)));
    assert_eq!(loaded.total_points(), 36);
    let frames: Vec<_> = loaded.views().iter().map(|v| v.frame_index()).collect();
    assert_eq!(frames, vec![0, 20, 40]);
}

#[test]
fn cache_document_uses_documented_keys() {
    let set = store_with_views(1).finish();
    let value = serde_json::to_value(set.to_file()).expect("to json");
    let obj = value.as_object().expect("object");
    let keys: Vec<_> = obj.keys().map(String::as_str).collect();
    for key in ["image_points", "object_points", "image_size", "frame_indices"] {
        assert!(keys.contains(&key), "missing key {key}");
    }
    assert_eq!(value["image_size"], serde_json::json!([640, 480]));
    assert_eq!(value["object_points"][0][5], serde_json::json!([1.0, 1.0, 0.0]));
}

#[test]
fn cache_without_frame_indices_numbers_views() {
    let mut file = store_with_views(2).finish().to_file();
    file.frame_indices.clear();
    let set = CorrespondenceSet::try_from(file).expect("valid");
    let frames: Vec<_> = set.views().iter().map(|v| v.frame_index()).collect();
    assert_eq!(frames, vec![0, 1]);
}

#[test]
fn cache_with_ragged_view_is_rejected() {
    let mut file: CorrespondenceFile = store_with_views(2).finish().to_file();
    file.object_points[1].pop();
    let err = CorrespondenceSet::try_from(file).unwrap_err();
    assert!(matches!(err, StoreError::InvalidCache(_)), "{err}");
}

#[test]
fn missing_cache_file_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = CorrespondenceSet::load_json(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
}

#[test]
fn store_resumes_from_loaded_set() {
    let set = store_with_views(2).finish();
    let mut store = CorrespondenceStore::from_set(set);
    let pattern = PatternGeometry::new(4, 3).expect("pattern");
    let img = vec![Point2::new(1.0, 1.0); pattern.corner_count()];
    assert!(matches!(
        store.accept(60, pattern.object_points(), img, 320, 240),
        Err(StoreError::DimensionMismatch { frame_index: 60, .. })
    ));
    assert_eq!(store.count(), 2);
}
