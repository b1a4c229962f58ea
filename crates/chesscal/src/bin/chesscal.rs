use std::error::Error;
use std::path::PathBuf;

use chesscal::core::{init_logging, LogFormat, LogOptions};
use chesscal::{calibrate, CalibrateConfig, CancelToken};
use clap::Parser;

/// Calibrate a camera from a chessboard video or image sequence.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Glob pattern of image files (quote it, e.g. 'frames/*.png'), a .gif animation,
    /// or a video file when built with the `ffmpeg` feature.
    input: Option<String>,

    /// Output file; `.json` writes JSON, anything else YAML.
    output: Option<PathBuf>,

    /// Inner corners of the chessboard, columns then rows.
    #[arg(long, num_args = 2, value_names = ["COLUMNS", "ROWS"])]
    pattern_size: Option<Vec<u32>>,

    /// Distance between neighbouring corners, in object units.
    #[arg(long)]
    square_size: Option<f64>,

    /// Offer every n-th frame of an animation to the detector.
    #[arg(long)]
    framestep: Option<usize>,

    /// Stop sampling once this many frames with a chessboard are found.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Write an annotated PNG per processed frame into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Save the detected correspondences to this JSON file.
    #[arg(short = 'c', long = "corners")]
    corners: Option<PathBuf>,

    /// Skip detection and solve from a saved correspondence file.
    #[arg(long)]
    load_corners: Option<PathBuf>,

    /// JSON run configuration; command-line values override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames detected concurrently.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Log one JSON object per line (with the `tracing` feature).
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> Result<CalibrateConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => CalibrateConfig::load_json(path)?,
            None => CalibrateConfig::default(),
        };
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(size) = self.pattern_size {
            if let [columns, rows] = size[..] {
                config.pattern_size = (columns, rows);
            }
        }
        if let Some(square_size) = self.square_size {
            config.square_size = square_size;
        }
        if let Some(framestep) = self.framestep {
            config.framestep = framestep;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        config.max_frames = self.max_frames.or(config.max_frames);
        config.debug_dir = self.debug_dir.or(config.debug_dir);
        config.corners_path = self.corners.or(config.corners_path);
        config.load_corners = self.load_corners.or(config.load_corners);

        if config.input.is_empty() && config.load_corners.is_none() {
            return Err("no input given: pass a glob pattern, .gif or video file, or --load-corners".into());
        }
        Ok(config)
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let format = if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Plain
    };
    init_logging(LogOptions {
        format,
        ..LogOptions::verbose(args.verbose)
    })?;
    let config = args.into_config()?;
    let result = calibrate(&config, &CancelToken::new())?;
    println!("RMS: {:.6}", result.rms);
    Ok(())
}
