//! Frame sources: ordered image files or a decoded animation sampled with a stride.
//!
//! With the `ffmpeg` feature, video containers are decoded by [`FfmpegFrames`].

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::{FfmpegFrames, VIDEO_EXTENSIONS};

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chesscal_core::GrayImage;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames};
use log::debug;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    #[error("no files match {0:?}")]
    EmptyGlob(String),
    #[cfg(feature = "ffmpeg")]
    #[error("failed to decode video {path}: {source}")]
    Video {
        path: PathBuf,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("unsupported input {0}: expected a glob pattern, a .gif animation or a video (ffmpeg feature)")]
    UnsupportedInput(PathBuf),
    #[error("frame stride must be at least 1")]
    InvalidStride,
}

/// Ordered supply of frames offered to the detector.
pub trait FrameSource {
    /// Next frame with its index in the underlying sequence; `Ok(None)` once exhausted.
    fn next_frame(&mut self) -> Result<Option<(usize, GrayImage)>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<(usize, GrayImage)>, SourceError> {
        (**self).next_frame()
    }
}

pub(crate) fn to_gray(img: DynamicImage) -> GrayImage {
    let luma = img.into_luma8();
    GrayImage {
        width: luma.width() as usize,
        height: luma.height() as usize,
        data: luma.into_raw(),
    }
}

/// One frame per file, in the given order. Every file is offered.
#[derive(Clone, Debug)]
pub struct ImageListSource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageListSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, next: 0 }
    }

    /// All files matching `pattern`, sorted by path.
    pub fn from_glob(pattern: &str) -> Result<Self, SourceError> {
        let matches = glob::glob_with(pattern, glob::MatchOptions::new()).map_err(|source| {
            SourceError::Pattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        let mut paths = matches.collect::<Result<Vec<_>, _>>()?;
        if paths.is_empty() {
            return Err(SourceError::EmptyGlob(pattern.to_string()));
        }
        paths.sort();
        debug!("{} files match {pattern}", paths.len());
        Ok(Self::new(paths))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageListSource {
    fn next_frame(&mut self) -> Result<Option<(usize, GrayImage)>, SourceError> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let index = self.next;
        self.next += 1;
        let img = image::ImageReader::open(path)
            .map_err(|source| SourceError::Io {
                path: path.clone(),
                source,
            })?
            .decode()
            .map_err(|source| SourceError::Decode {
                path: path.clone(),
                source,
            })?;
        Ok(Some((index, to_gray(img))))
    }
}

/// Sequential decoder behind a [`VideoSource`].
pub trait FrameDecoder {
    /// Next decoded frame; `Ok(None)` at end of stream.
    fn decode_next(&mut self) -> Result<Option<GrayImage>, SourceError>;
}

/// Any iterator of frames decodes to itself.
impl<I: Iterator<Item = GrayImage>> FrameDecoder for I {
    fn decode_next(&mut self) -> Result<Option<GrayImage>, SourceError> {
        Ok(self.next())
    }
}

/// Animated GIF frames, decoded lazily.
pub struct GifFrames {
    path: PathBuf,
    frames: Frames<'static>,
}

impl GifFrames {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|source| SourceError::Decode {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            frames: decoder.into_frames(),
        })
    }
}

impl std::fmt::Debug for GifFrames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GifFrames").field("path", &self.path).finish()
    }
}

impl FrameDecoder for GifFrames {
    fn decode_next(&mut self) -> Result<Option<GrayImage>, SourceError> {
        match self.frames.next() {
            None => Ok(None),
            Some(Err(source)) => Err(SourceError::Decode {
                path: self.path.clone(),
                source,
            }),
            Some(Ok(frame)) => Ok(Some(to_gray(DynamicImage::ImageRgba8(frame.into_buffer())))),
        }
    }
}

/// Every `stride`-th decoded frame, starting with frame 0.
///
/// Frame indices count every decoded frame, so with stride 20 the offered
/// indices are 0, 20, 40, ...
#[derive(Debug)]
pub struct VideoSource<D> {
    decoder: D,
    stride: usize,
    position: usize,
}

impl<D: FrameDecoder> VideoSource<D> {
    pub fn new(decoder: D, stride: usize) -> Result<Self, SourceError> {
        if stride == 0 {
            return Err(SourceError::InvalidStride);
        }
        Ok(Self {
            decoder,
            stride,
            position: 0,
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl<D: FrameDecoder> FrameSource for VideoSource<D> {
    fn next_frame(&mut self) -> Result<Option<(usize, GrayImage)>, SourceError> {
        loop {
            let Some(frame) = self.decoder.decode_next()? else {
                return Ok(None);
            };
            let index = self.position;
            self.position += 1;
            if index % self.stride == 0 {
                return Ok(Some((index, frame)));
            }
        }
    }
}

/// Source for a CLI-style input: a glob pattern (contains `*`), a `.gif`
/// file, or with the `ffmpeg` feature one of [`VIDEO_EXTENSIONS`].
pub fn open_source(input: &str, framestep: usize) -> Result<Box<dyn FrameSource>, SourceError> {
    if input.contains('*') {
        return Ok(Box::new(ImageListSource::from_glob(input)?));
    }
    let path = Path::new(input);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("gif") => Ok(Box::new(VideoSource::new(GifFrames::open(path)?, framestep)?)),
        #[cfg(feature = "ffmpeg")]
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => {
            Ok(Box::new(VideoSource::new(FfmpegFrames::open(path)?, framestep)?))
        }
        _ => Err(SourceError::UnsupportedInput(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> impl Iterator<Item = GrayImage> {
        (0..n).map(|i| GrayImage::filled(4, 3, i as u8))
    }

    #[test]
    fn video_stride_offers_every_nth_frame() {
        let mut source = VideoSource::new(frames(100), 20).expect("source");
        let mut offered = Vec::new();
        while let Some((index, frame)) = source.next_frame().expect("frame") {
            assert_eq!(frame.data[0] as usize, index);
            offered.push(index);
        }
        assert_eq!(offered, vec![0, 20, 40, 60, 80]);
        assert!(source.next_frame().expect("exhausted").is_none());
    }

    #[test]
    fn zero_stride_is_rejected() {
        assert!(matches!(VideoSource::new(frames(3), 0), Err(SourceError::InvalidStride)));
    }

    #[test]
    fn unsupported_container_is_rejected() {
        let err = open_source("notes.txt", 20).err().expect("error");
        assert!(matches!(err, SourceError::UnsupportedInput(_)), "{err}");
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn video_containers_need_ffmpeg() {
        let err = open_source("clip.mp4", 20).err().expect("error");
        assert!(matches!(err, SourceError::UnsupportedInput(_)), "{err}");
    }

    #[cfg(feature = "ffmpeg")]
    #[test]
    fn missing_video_is_a_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.mp4");
        let err = open_source(path.to_str().expect("utf-8 path"), 20).err().expect("error");
        assert!(matches!(err, SourceError::Video { .. }), "{err}");
    }

    #[cfg(feature = "ffmpeg")]
    #[test]
    fn ffmpeg_decodes_animation_frames_with_stride() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.gif");
        write_gif(&path, 7);

        let mut source = VideoSource::new(FfmpegFrames::open(&path).expect("open"), 3).expect("source");
        let mut offered = Vec::new();
        while let Some((index, frame)) = source.next_frame().expect("frame") {
            assert_eq!((frame.width, frame.height), (6, 4));
            assert_eq!(frame.data.len(), 24);
            offered.push(index);
        }
        assert_eq!(offered, vec![0, 3, 6]);
    }

    #[test]
    fn empty_glob_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pattern = format!("{}/*.png", dir.path().display());
        assert!(matches!(
            ImageListSource::from_glob(&pattern),
            Err(SourceError::EmptyGlob(_))
        ));
    }

    /// `count` flat 6x4 frames of increasing brightness.
    fn write_gif(path: &Path, count: u8) {
        let file = File::create(path).expect("create");
        let mut encoder = image::codecs::gif::GifEncoder::new(file);
        let frames = (0..count).map(|i| {
            image::Frame::new(image::RgbaImage::from_pixel(6, 4, image::Rgba([i * 30, i * 30, i * 30, 255])))
        });
        encoder.encode_frames(frames).expect("encode");
    }

    #[test]
    fn gif_frames_are_strided() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.gif");
        write_gif(&path, 7);

        let mut source = open_source(path.to_str().expect("utf-8 path"), 3).expect("source");
        let mut offered = Vec::new();
        while let Some((index, frame)) = source.next_frame().expect("frame") {
            assert_eq!((frame.width, frame.height), (6, 4));
            offered.push(index);
        }
        assert_eq!(offered, vec![0, 3, 6]);
    }

    #[test]
    fn image_list_yields_files_in_sorted_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            image::GrayImage::from_pixel(5, 4, image::Luma([value]))
                .save(dir.path().join(name))
                .expect("save");
        }
        let pattern = format!("{}/*.png", dir.path().display());
        let mut source = ImageListSource::from_glob(&pattern).expect("glob");
        assert_eq!(source.len(), 3);

        let mut seen = Vec::new();
        while let Some((index, frame)) = source.next_frame().expect("frame") {
            assert_eq!((frame.width, frame.height), (5, 4));
            seen.push((index, frame.data[0]));
        }
        assert_eq!(seen, vec![(0, 10), (1, 20), (2, 30)]);
    }
}
