//! The sampling loop: pull frames, detect, accept or reject, until the source
//! runs dry, enough views are accepted, or the run is cancelled.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chesscal_chessboard::PatternDetector;
use chesscal_core::{CorrespondenceSet, CorrespondenceStore, DetectionResult, GrayImage};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::debug_draw::write_debug_image;
use crate::source::FrameSource;
use crate::CalibrateError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    /// Stop once this many views are accepted.
    pub max_frames: Option<usize>,
    /// Write an annotated PNG per processed frame here.
    pub debug_dir: Option<PathBuf>,
    /// Frames detected concurrently; 1 keeps the loop sequential.
    pub jobs: usize,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_frames: None,
            debug_dir: None,
            jobs: 1,
        }
    }
}

/// Shared flag that stops sampling before the next frame is pulled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    SourceExhausted,
    MaxFrames,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub set: CorrespondenceSet,
    /// Frames offered to the detector.
    pub frames_processed: usize,
    pub stop: StopReason,
}

/// Sample `source` with `detector`, pairing each found grid with the object
/// points of the detector's own pattern.
///
/// With `params.jobs > 1` up to `jobs` frames are detected concurrently, but
/// acceptance, debug output and the `max_frames` rule still follow frame order,
/// so the result does not depend on `jobs`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(jobs = params.jobs, max_frames = ?params.max_frames))
)]
pub fn run<S, D>(
    source: &mut S,
    detector: &D,
    params: &RunParams,
    cancel: &CancelToken,
) -> Result<RunSummary, CalibrateError>
where
    S: FrameSource + ?Sized,
    D: PatternDetector,
{
    let pattern = detector.pattern();
    pattern.validate()?;
    if let Some(dir) = &params.debug_dir {
        std::fs::create_dir_all(dir).map_err(|source| CalibrateError::Output {
            path: dir.clone(),
            source,
        })?;
    }

    let object_points = pattern.object_points();
    let jobs = params.jobs.max(1);
    let mut store = CorrespondenceStore::new();
    let mut frames_processed = 0;

    let stop = 'sampling: loop {
        let mut batch: Vec<(usize, GrayImage)> = Vec::with_capacity(jobs);
        let mut pending_stop = None;
        while batch.len() < jobs {
            if cancel.is_cancelled() {
                pending_stop = Some(StopReason::Cancelled);
                break;
            }
            match source.next_frame()? {
                Some(frame) => batch.push(frame),
                None => {
                    pending_stop = Some(StopReason::SourceExhausted);
                    break;
                }
            }
        }

        let results: Vec<DetectionResult> = if batch.len() > 1 {
            batch
                .par_iter()
                .map(|(_, frame)| detector.detect(&frame.view()))
                .collect()
        } else {
            batch
                .iter()
                .map(|(_, frame)| detector.detect(&frame.view()))
                .collect()
        };

        for ((index, frame), result) in batch.iter().zip(results) {
            frames_processed += 1;
            if result.found {
                info!("frame {index}: chessboard found");
                store.accept(
                    *index,
                    object_points.clone(),
                    result.corners.clone(),
                    frame.width,
                    frame.height,
                )?;
            } else {
                info!("frame {index}: chessboard not found");
            }

            if let Some(dir) = &params.debug_dir {
                write_debug_image(dir, *index, frame, pattern, &result)?;
            }

            // Only an accepted view can complete the quota.
            if result.found && params.max_frames.is_some_and(|max| store.count() >= max) {
                info!("found {} frames with the chessboard", store.count());
                break 'sampling StopReason::MaxFrames;
            }
        }

        if let Some(stop) = pending_stop {
            break stop;
        }
    };

    debug!("sampling stopped ({stop:?}) after {frames_processed} frames");
    info!("accepted {} views", store.count());
    Ok(RunSummary {
        set: store.finish(),
        frames_processed,
        stop,
    })
}
