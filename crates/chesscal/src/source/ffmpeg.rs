//! Video containers decoded with `ffmpeg-next`.

use std::path::{Path, PathBuf};

use chesscal_core::GrayImage;
use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{self, flag::Flags};
use ffmpeg::util::frame::Video;
use log::debug;

use super::{FrameDecoder, SourceError};

/// Container extensions routed to ffmpeg by [`open_source`](super::open_source).
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "webm", "m4v", "mpg"];

/// Frames of the best video stream of a container, converted to 8-bit gray.
pub struct FfmpegFrames {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    flushed: bool,
}

impl FfmpegFrames {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let err = |source| SourceError::Video {
            path: path.clone(),
            source,
        };
        ffmpeg::init().map_err(err)?;

        let input = ffmpeg::format::input(&path).map_err(err)?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| err(ffmpeg::Error::StreamNotFound))?;
        let stream_index = stream.index();
        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(err)?;
        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::GRAY8,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )
        .map_err(err)?;
        debug!(
            "{}: video stream {stream_index}, {}x{}",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path,
            input,
            decoder,
            scaler,
            stream_index,
            flushed: false,
        })
    }

    fn video_error(&self, source: ffmpeg::Error) -> SourceError {
        SourceError::Video {
            path: self.path.clone(),
            source,
        }
    }

    fn to_gray(&mut self, decoded: &Video) -> Result<GrayImage, SourceError> {
        let mut gray = Video::empty();
        self.scaler
            .run(decoded, &mut gray)
            .map_err(|source| self.video_error(source))?;
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        let stride = gray.stride(0);
        // Rows of the plane are padded to `stride` bytes.
        let data = gray
            .data(0)
            .chunks(stride)
            .take(height)
            .flat_map(|row| &row[..width.min(row.len())])
            .copied()
            .collect();
        Ok(GrayImage {
            width,
            height,
            data,
        })
    }
}

impl std::fmt::Debug for FfmpegFrames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegFrames")
            .field("path", &self.path)
            .field("stream_index", &self.stream_index)
            .finish()
    }
}

impl FrameDecoder for FfmpegFrames {
    fn decode_next(&mut self) -> Result<Option<GrayImage>, SourceError> {
        loop {
            let mut decoded = Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.to_gray(&decoded).map(Some);
            }
            if self.flushed {
                return Ok(None);
            }
            let index = self.stream_index;
            let packet = self
                .input
                .packets()
                .find_map(|(stream, packet)| (stream.index() == index).then_some(packet));
            let sent = match packet {
                Some(packet) => self.decoder.send_packet(&packet),
                None => {
                    self.flushed = true;
                    self.decoder.send_eof()
                }
            };
            sent.map_err(|source| self.video_error(source))?;
        }
    }
}
