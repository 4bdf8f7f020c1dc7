//! Pipeline supervisor tying together capture, vision, frame logging and the
//! stall watchdog.
//!
//! The pipeline wires the bounded queues between stages, feeds heartbeats to
//! the watchdog, and tears the stages down in dependency order.

pub mod config;
pub mod telemetry;
pub mod watchdog;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use handoff::{BoundedQueue, CancelToken, Worker};
use tracing::{info, warn};
use video_ingest::{
    CaptureError, CaptureHandle, DirectorySource, Frame, FrameLogger, FrameSource, LoggerConfig,
    spawn_capture,
};

use crate::{
    compute::{ComputeConfig, VisionWorker},
    output::{SharedOutput, shared_output},
};
use config::{PipelineConfig, SourceKind};
use watchdog::{HealthComponent, PipelineHealth, WATCHDOG_POLL_INTERVAL_MS, WatchdogState};

/// Running capture → vision → logger stages.
pub struct Pipeline {
    capture: Option<CaptureHandle>,
    vision: Option<VisionWorker>,
    logger: Option<FrameLogger>,
    watchdog: Option<Worker>,
    output: SharedOutput,
    cancel: CancelToken,
    watchdog_state: Arc<WatchdogState>,
}

impl Pipeline {
    /// Open the configured source and start every stage.
    pub fn start(config: &PipelineConfig, cancel: CancelToken) -> Result<Self> {
        let source = open_source(config)?;
        Self::start_with_source(config, source, cancel)
    }

    /// Start every stage around an already opened source.
    pub fn start_with_source<S>(config: &PipelineConfig, source: S, cancel: CancelToken) -> Result<Self>
    where
        S: FrameSource + 'static,
    {
        let pipeline_span = tracing::info_span!(
            "rover.pipeline",
            source = %config.source_label(),
            width = config.width,
            height = config.height,
            strategy = config.segmentation.label(),
        );
        let _span_guard = pipeline_span.enter();

        if source.width() != config.width || source.height() != config.height {
            warn!(
                "source reports {}x{}, pipeline configured for {}x{}",
                source.width(),
                source.height(),
                config.width,
                config.height
            );
        }

        let health = Arc::new(PipelineHealth::new());
        let watchdog_state = Arc::new(WatchdogState::new());
        let output = shared_output();
        let frames: Arc<BoundedQueue<Frame>> = Arc::new(BoundedQueue::new(config.queue_capacity));

        let logger = match &config.logging {
            Some(opts) => {
                let beat_health = health.clone();
                let logger = FrameLogger::start(
                    LoggerConfig {
                        dir: opts.dir.clone(),
                        jpeg_quality: opts.jpeg_quality,
                        queue_capacity: opts.queue_capacity,
                    },
                    move || beat_health.beat(HealthComponent::Logger),
                )
                .with_context(|| format!("Failed to start frame logger in {}", opts.dir.display()))?;
                health.monitor_logger(true);
                info!("logging every 5th frame to {}", opts.dir.display());
                Some(logger)
            }
            None => None,
        };

        let mut compute = ComputeConfig::new(config.width, config.height, config.segmentation);
        compute.calibrate = config.calibrate;
        let vision = {
            let beat_health = health.clone();
            VisionWorker::spawn(
                compute,
                frames.clone(),
                logger.as_ref().map(FrameLogger::queue),
                output.clone(),
                move || beat_health.beat(HealthComponent::Vision),
            )
            .context("Failed to start vision worker")?
        };

        let capture = {
            let beat_health = health.clone();
            spawn_capture(source, frames, cancel.clone(), move || {
                beat_health.beat(HealthComponent::Capture)
            })
            .context("Failed to start capture")?
        };

        let watchdog = if config.watchdog {
            Some(
                watchdog::spawn_watchdog(
                    health,
                    cancel.clone(),
                    watchdog_state.clone(),
                    Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS),
                )
                .context("Failed to start watchdog")?,
            )
        } else {
            None
        };

        info!("pipeline started");
        Ok(Self {
            capture: Some(capture),
            vision: Some(vision),
            logger,
            watchdog,
            output,
            cancel,
            watchdog_state,
        })
    }

    /// Latest published vision result.
    pub fn output(&self) -> SharedOutput {
        self.output.clone()
    }

    /// How the capture source ended, once it has.
    pub fn capture_exit(&self) -> Option<Result<(), CaptureError>> {
        self.capture.as_ref().and_then(CaptureHandle::poll_exit)
    }

    /// Stage that made the watchdog fire, if it did.
    pub fn watchdog_reason(&self) -> Option<HealthComponent> {
        self.watchdog_state.reason()
    }

    /// Stop capture, let vision and the logger drain, then stop the watchdog.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        if self.capture.is_none()
            && self.vision.is_none()
            && self.logger.is_none()
            && self.watchdog.is_none()
        {
            return Ok(());
        }
        let mut first_error = None;
        let mut record = |result: Result<()>| {
            if let Err(err) = result {
                warn!("shutdown: {err:#}");
                first_error.get_or_insert(err);
            }
        };

        if let Some(capture) = self.capture.take() {
            record(capture.stop().context("capture worker"));
        }
        if let Some(vision) = self.vision.take() {
            record(vision.stop().context("vision worker"));
        }
        if let Some(logger) = self.logger.take() {
            record(logger.stop().context("frame logger"));
        }
        if let Some(watchdog) = self.watchdog.take() {
            self.cancel.cancel();
            record(watchdog.join().context("watchdog"));
        }
        info!("pipeline stopped");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.shutdown_inner();
    }
}

/// Build the frame source named by the configuration.
pub fn open_source(config: &PipelineConfig) -> Result<Box<dyn FrameSource>> {
    let size = (config.width, config.height);
    match &config.source {
        SourceKind::Replay(dir) => {
            let source = DirectorySource::open(dir, size, config.fps, config.replay_loop)
                .with_context(|| format!("Failed to open replay directory {}", dir.display()))?;
            info!("replaying {} image(s) from {}", source.len(), dir.display());
            Ok(Box::new(source))
        }
        SourceKind::Device(uri) => Ok(device_source(uri, size, config.fps)),
    }
}

#[cfg(feature = "opencv")]
fn device_source(uri: &str, size: (i32, i32), fps: u32) -> Box<dyn FrameSource> {
    Box::new(video_ingest::CameraSource::new(uri, size, fps))
}

#[cfg(not(feature = "opencv"))]
fn device_source(uri: &str, size: (i32, i32), fps: u32) -> Box<dyn FrameSource> {
    Box::new(video_ingest::FfmpegSource::new(uri, size, fps))
}
