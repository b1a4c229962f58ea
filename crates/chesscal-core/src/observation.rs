//! Accumulated 2D-3D correspondences and their JSON cache.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("frame {frame_index}: image size {actual:?} differs from accepted views {expected:?}")]
    DimensionMismatch {
        frame_index: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("frame {frame_index}: {object_points} object points vs {image_points} image points")]
    LengthMismatch {
        frame_index: usize,
        object_points: usize,
        image_points: usize,
    },
    #[error("invalid correspondence cache: {0}")]
    InvalidCache(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One accepted frame: object points and their detected image positions.
///
/// Immutable once built; the two sequences are index-aligned and non-empty.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewObservation {
    frame_index: usize,
    object_points: Vec<Point3<f64>>,
    image_points: Vec<Point2<f64>>,
}

impl ViewObservation {
    pub fn new(
        frame_index: usize,
        object_points: Vec<Point3<f64>>,
        image_points: Vec<Point2<f64>>,
    ) -> Result<Self, StoreError> {
        if object_points.len() != image_points.len() || object_points.is_empty() {
            return Err(StoreError::LengthMismatch {
                frame_index,
                object_points: object_points.len(),
                image_points: image_points.len(),
            });
        }
        Ok(Self {
            frame_index,
            object_points,
            image_points,
        })
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object_points
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }
}

/// Ordered accepted views sharing one image size. Read-only input of the solver.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrespondenceSet {
    views: Vec<ViewObservation>,
    image_size: Option<(usize, usize)>,
}

impl CorrespondenceSet {
    pub fn views(&self) -> &[ViewObservation] {
        &self.views
    }

    /// `(width, height)` shared by every view, `None` while empty.
    pub fn image_size(&self) -> Option<(usize, usize)> {
        self.image_size
    }

    pub fn count(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Total number of point correspondences over all views.
    pub fn total_points(&self) -> usize {
        self.views.iter().map(ViewObservation::len).sum()
    }

    pub fn to_file(&self) -> CorrespondenceFile {
        let (w, h) = self.image_size.unwrap_or((0, 0));
        CorrespondenceFile {
            image_points: self
                .views
                .iter()
                .map(|v| v.image_points.iter().map(|p| [p.x, p.y]).collect())
                .collect(),
            object_points: self
                .views
                .iter()
                .map(|v| v.object_points.iter().map(|p| [p.x, p.y, p.z]).collect())
                .collect(),
            image_size: [w, h],
            frame_indices: self.views.iter().map(|v| v.frame_index).collect(),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        self.to_file().write_json(path)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        CorrespondenceFile::load_json(path)?.try_into()
    }
}

/// Appends accepted views and enforces a single image size.
#[derive(Debug, Default)]
pub struct CorrespondenceStore {
    set: CorrespondenceSet,
}

impl CorrespondenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue accumulating on top of a previously saved set.
    pub fn from_set(set: CorrespondenceSet) -> Self {
        Self { set }
    }

    /// Append one view. The first accepted view fixes the image size.
    pub fn accept(
        &mut self,
        frame_index: usize,
        object_points: Vec<Point3<f64>>,
        image_points: Vec<Point2<f64>>,
        width: usize,
        height: usize,
    ) -> Result<(), StoreError> {
        if let Some(expected) = self.set.image_size {
            if expected != (width, height) {
                return Err(StoreError::DimensionMismatch {
                    frame_index,
                    expected,
                    actual: (width, height),
                });
            }
        }
        let view = ViewObservation::new(frame_index, object_points, image_points)?;
        self.set.image_size = Some((width, height));
        self.set.views.push(view);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.set.count()
    }

    pub fn set(&self) -> &CorrespondenceSet {
        &self.set
    }

    /// Stop accepting and hand the set over.
    pub fn finish(self) -> CorrespondenceSet {
        self.set
    }
}

/// On-disk layout of a [`CorrespondenceSet`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceFile {
    pub image_points: Vec<Vec<[f64; 2]>>,
    pub object_points: Vec<Vec<[f64; 3]>>,
    pub image_size: [usize; 2],
    #[serde(default)]
    pub frame_indices: Vec<usize>,
}

impl CorrespondenceFile {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }
}

impl TryFrom<CorrespondenceFile> for CorrespondenceSet {
    type Error = StoreError;

    fn try_from(file: CorrespondenceFile) -> Result<Self, Self::Error> {
        let n = file.image_points.len();
        if file.object_points.len() != n {
            return Err(StoreError::InvalidCache(format!(
                "{n} image point views vs {} object point views",
                file.object_points.len()
            )));
        }
        let frame_indices = if file.frame_indices.is_empty() {
            (0..n).collect()
        } else if file.frame_indices.len() == n {
            file.frame_indices
        } else {
            return Err(StoreError::InvalidCache(format!(
                "{} frame indices for {n} views",
                file.frame_indices.len()
            )));
        };

        let [w, h] = file.image_size;
        if n > 0 && (w == 0 || h == 0) {
            return Err(StoreError::InvalidCache(format!("image size {w}x{h}")));
        }

        let mut store = CorrespondenceStore::new();
        for ((img, obj), frame_index) in file
            .image_points
            .into_iter()
            .zip(file.object_points)
            .zip(frame_indices)
        {
            let object_points = obj.into_iter().map(|[x, y, z]| Point3::new(x, y, z)).collect();
            let image_points = img.into_iter().map(|[x, y]| Point2::new(x, y)).collect();
            store
                .accept(frame_index, object_points, image_points, w, h)
                .map_err(|e| StoreError::InvalidCache(e.to_string()))?;
        }
        Ok(store.finish())
    }
}
