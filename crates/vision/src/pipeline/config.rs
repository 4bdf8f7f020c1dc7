//! Configuration parsing for the vision pipeline.
//!
//! This module owns translation of CLI arguments into a `PipelineConfig`
//! which the capture, vision and logging stages use without re-parsing flags.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use clap::Args;

use crate::segment::Segmentation;

const DEFAULT_SOURCE: &str = "/dev/video0";
const DEFAULT_WIDTH: i32 = 320;
const DEFAULT_HEIGHT: i32 = 240;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_QUEUE_CAPACITY: usize = 4;
const DEFAULT_LOG_QUEUE_CAPACITY: usize = 4;
const DEFAULT_JPEG_QUALITY: u8 = 85;
const MAX_DIMENSION: i32 = 8192;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Where frames come from.
pub enum SourceKind {
    /// Camera device or stream URI read through ffmpeg (or OpenCV).
    Device(String),
    /// Directory of still images replayed in name order.
    Replay(PathBuf),
}

impl SourceKind {
    /// Infer the source from a URI: `dir:` prefix or an existing directory
    /// means replay, anything else is handed to the camera backend.
    pub(crate) fn from_uri(uri: &str) -> Self {
        if let Some(dir) = uri.strip_prefix("dir:") {
            SourceKind::Replay(PathBuf::from(dir))
        } else if Path::new(uri).is_dir() {
            SourceKind::Replay(PathBuf::from(uri))
        } else {
            SourceKind::Device(uri.to_string())
        }
    }
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by every stage in the pipeline.
pub struct PipelineConfig {
    /// Frame source selected from the URI.
    pub source: SourceKind,
    /// Frame width every stage agrees on.
    pub width: i32,
    /// Frame height every stage agrees on.
    pub height: i32,
    /// Requested capture / replay rate.
    pub fps: u32,
    /// Loop replay directories instead of stopping at the last file.
    pub replay_loop: bool,
    /// Capacity of the capture → vision frame queue.
    pub queue_capacity: usize,
    pub segmentation: Segmentation,
    /// Log the binarisation threshold of every usable frame.
    pub calibrate: bool,
    /// Frame logging, disabled when `None`.
    pub logging: Option<LoggingOptions>,
    /// Stop the vehicle when a stage stops making progress.
    pub watchdog: bool,
    /// Telemetry and instrumentation options.
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug)]
/// Disk logging of sampled frames.
pub struct LoggingOptions {
    pub dir: PathBuf,
    pub jpeg_quality: u8,
    pub queue_capacity: usize,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Raise the default log level to `debug`.
    pub verbose: bool,
}

/// CLI arguments for the capture and vision stages.
#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Camera URI, device path, or image directory.
    #[arg(value_name = "SOURCE")]
    pub source: Option<String>,

    /// Source flag (overrides positional).
    #[arg(long = "source", value_name = "URI")]
    pub source_flag: Option<String>,
    /// Frame width in pixels.
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<i32>,
    /// Frame height in pixels.
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<i32>,
    /// Capture rate in frames per second.
    #[arg(long = "fps", value_name = "N")]
    pub fps: Option<u32>,
    /// Loop an image directory source.
    #[arg(long = "loop", action = clap::ArgAction::SetTrue)]
    pub replay_loop: bool,
    /// Capacity of the frame queue between capture and vision.
    #[arg(long = "queue-capacity", value_name = "N")]
    pub queue_capacity: Option<usize>,
    /// Line segmentation strategy.
    #[arg(long = "segmentation", value_enum, default_value_t = Segmentation::Threshold)]
    pub segmentation: Segmentation,
    /// Log the chosen threshold of every frame with a usable line.
    #[arg(long = "calibrate", action = clap::ArgAction::SetTrue)]
    pub calibrate: bool,
    /// Write every 5th frame as JPEG into this directory.
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
    /// JPEG quality for logged frames (1-100).
    #[arg(long = "log-quality", value_name = "QUALITY")]
    pub log_quality: Option<u8>,
    /// Disable the stall watchdog.
    #[arg(long = "no-watchdog", action = clap::ArgAction::SetTrue)]
    pub no_watchdog: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl TryFrom<PipelineArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(args: PipelineArgs) -> Result<Self> {
        let uri = args
            .source_flag
            .or(args.source)
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        if uri.trim().is_empty() {
            bail!("Source URI must not be empty");
        }

        let width = args.width.unwrap_or(DEFAULT_WIDTH);
        let height = args.height.unwrap_or(DEFAULT_HEIGHT);
        if width <= 0 || height <= 0 {
            bail!("Frame width and height must be positive integers");
        }
        if height < 2 {
            bail!("Frame height must be at least 2 pixels");
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            bail!("Frame width and height must not exceed {MAX_DIMENSION} pixels");
        }

        let fps = args.fps.unwrap_or(DEFAULT_FPS);
        if fps == 0 {
            bail!("--fps must be at least 1");
        }

        let queue_capacity = args.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            bail!("--queue-capacity must be at least 1");
        }

        let jpeg_quality = args.log_quality.unwrap_or(DEFAULT_JPEG_QUALITY);
        if !(1..=100).contains(&jpeg_quality) {
            bail!("--log-quality must be an integer between 1 and 100");
        }
        if args.log_quality.is_some() && args.log_dir.is_none() {
            return Err(anyhow!("--log-quality requires --log-dir"));
        }
        let logging = args.log_dir.map(|dir| LoggingOptions {
            dir,
            jpeg_quality,
            queue_capacity: DEFAULT_LOG_QUEUE_CAPACITY,
        });

        let telemetry = TelemetryOptions {
            chrome_trace_path: args.chrome_trace,
            verbose: args.verbose,
        };

        Ok(Self {
            source: SourceKind::from_uri(&uri),
            width,
            height,
            fps,
            replay_loop: args.replay_loop,
            queue_capacity,
            segmentation: args.segmentation,
            calibrate: args.calibrate,
            logging,
            watchdog: !args.no_watchdog,
            telemetry,
        })
    }
}

impl PipelineConfig {
    /// Human readable source description for logs.
    pub fn source_label(&self) -> String {
        match &self.source {
            SourceKind::Device(uri) => uri.clone(),
            SourceKind::Replay(dir) => format!("dir:{}", dir.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        pipeline: PipelineArgs,
    }

    fn parse(args: &[&str]) -> Result<PipelineConfig> {
        let cli = TestCli::try_parse_from(std::iter::once("rover").chain(args.iter().copied()))?;
        PipelineConfig::try_from(cli.pipeline)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.source, SourceKind::Device(DEFAULT_SOURCE.into()));
        assert_eq!((config.width, config.height), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.segmentation, Segmentation::Threshold);
        assert!(config.logging.is_none());
        assert!(config.watchdog);
    }

    #[test]
    fn flag_overrides_positional_source() {
        let config = parse(&["rtsp://cam/a", "--source", "rtsp://cam/b"]).unwrap();
        assert_eq!(config.source, SourceKind::Device("rtsp://cam/b".into()));
    }

    #[test]
    fn dir_prefix_selects_replay() {
        let config = parse(&["dir:/tmp/run1", "--segmentation", "edge"]).unwrap();
        assert_eq!(config.source, SourceKind::Replay(PathBuf::from("/tmp/run1")));
        assert_eq!(config.segmentation, Segmentation::Edge);
        assert_eq!(config.source_label(), "dir:/tmp/run1");
    }

    #[test]
    fn existing_directory_selects_replay() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().to_str().unwrap();
        assert_eq!(
            SourceKind::from_uri(uri),
            SourceKind::Replay(dir.path().to_path_buf())
        );
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--height", "-5"]).is_err());
        assert!(parse(&["--height", "1"]).is_err());
        assert!(parse(&["--width", "50000", "--height", "50000"]).is_err());
        assert!(parse(&["--width", "8192", "--height", "8192"]).is_ok());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        assert!(parse(&["--queue-capacity", "0"]).is_err());
        assert!(parse(&["--fps", "0"]).is_err());
    }

    #[test]
    fn logging_options() {
        let config = parse(&["--log-dir", "/tmp/frames", "--log-quality", "70"]).unwrap();
        let logging = config.logging.unwrap();
        assert_eq!(logging.dir, PathBuf::from("/tmp/frames"));
        assert_eq!(logging.jpeg_quality, 70);
        assert!(parse(&["--log-quality", "70"]).is_err());
        assert!(parse(&["--log-dir", "/tmp/x", "--log-quality", "0"]).is_err());
    }
}
