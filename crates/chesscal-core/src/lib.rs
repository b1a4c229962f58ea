//! Core types and utilities for chessboard camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete corner detector, solver or image codec. It holds
//! the pieces every stage of the pipeline agrees on:
//!
//! - [`PatternGeometry`]: the physical grid and its object-space points,
//! - [`GrayImage`] / [`GrayImageView`]: the single-channel frames,
//! - [`DetectionResult`]: what a detector reports for one frame,
//! - [`ViewObservation`], [`CorrespondenceSet`], [`CorrespondenceStore`]:
//!   accumulated 2D-3D correspondences and their on-disk cache,
//! - [`Homography`] and the normalized DLT used for plane-to-image mappings.

mod corner;
mod homography;
mod image;
mod logger;
mod observation;
mod orientation_clustering;
mod pattern;
pub mod synthetic;

pub use corner::{Corner, DetectionResult};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear_clamped, GrayImage, GrayImageView};

pub use logger::{init_logging, LogFormat, LogOptions, LoggerError};
pub use observation::{
    CorrespondenceFile, CorrespondenceSet, CorrespondenceStore, StoreError, ViewObservation,
};
pub use orientation_clustering::{
    cluster_orientations, OrientationClusteringParams, OrientationClusteringResult,
};
pub use pattern::{PatternError, PatternGeometry};
