//! OpenCV-backed camera capture, enabled with the `opencv` feature.

use std::{thread, time::Duration};

use chrono::Utc;
use handoff::CancelToken;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{info, warn};

use crate::{CaptureError, Frame, FrameFormat, FrameSink, FrameSource, ffmpeg::parse_device_index};

/// Consecutive empty reads from a device before it counts as lost.
const MAX_EMPTY_READS: u32 = 30;
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(10);

/// What to do after `VideoCapture::read` delivered nothing.
#[derive(Debug)]
enum EmptyRead {
    Retry,
    Finished(Result<(), CaptureError>),
}

/// A file that stops delivering has ended. A device gets a short run of
/// retries before it is reported lost.
fn on_empty_read(uri: &str, is_device: bool, streak: u32) -> EmptyRead {
    if !is_device {
        return EmptyRead::Finished(Ok(()));
    }
    if streak >= MAX_EMPTY_READS {
        EmptyRead::Finished(Err(CaptureError::Lost {
            uri: uri.to_string(),
        }))
    } else {
        EmptyRead::Retry
    }
}

/// Reads frames from a V4L device or URI through `cv::VideoCapture`.
///
/// Frames that arrive at another size are resized to the agreed geometry.
pub struct CameraSource {
    uri: String,
    width: i32,
    height: i32,
    fps: u32,
}

impl CameraSource {
    pub fn new(uri: &str, target_size: (i32, i32), fps: u32) -> Self {
        Self {
            uri: uri.to_string(),
            width: target_size.0,
            height: target_size.1,
            fps,
        }
    }
}

impl FrameSource for CameraSource {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn run(&mut self, sink: &FrameSink, cancel: &CancelToken) -> Result<(), CaptureError> {
        let mut cap = open_video_capture(&self.uri)?;
        configure_camera(&mut cap, (self.width, self.height), self.fps as f64);

        let mut frame = Mat::default();
        let mut scratch = Mat::default();
        let (target_w, target_h) = (self.width, self.height);
        let is_device = parse_device_index(&self.uri).is_some();
        let mut empty_reads = 0u32;

        while !cancel.is_cancelled() && !sink.is_closed() {
            let got = cap
                .read(&mut frame)
                .map_err(|e| CaptureError::Other(e.into()))?;

            let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
            if !got || size.width <= 0 {
                empty_reads += 1;
                match on_empty_read(&self.uri, is_device, empty_reads) {
                    EmptyRead::Retry => {
                        thread::sleep(EMPTY_READ_BACKOFF);
                        continue;
                    }
                    EmptyRead::Finished(result) => {
                        if result.is_ok() {
                            info!("{} reached end of stream", self.uri);
                        }
                        return result;
                    }
                }
            }
            empty_reads = 0;

            let working = if size.width != target_w || size.height != target_h {
                opencv::imgproc::resize(
                    &frame,
                    &mut scratch,
                    core::Size {
                        width: target_w,
                        height: target_h,
                    },
                    0.0,
                    0.0,
                    opencv::imgproc::INTER_LINEAR,
                )
                .map_err(|e| CaptureError::Other(e.into()))?;
                &scratch
            } else {
                &frame
            };

            let data = working
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec();

            let pushed = sink.push(Frame {
                data,
                width: target_w,
                height: target_h,
                timestamp_ms: Utc::now().timestamp_millis(),
                format: FrameFormat::Bgr8,
            });
            if !pushed {
                break;
            }
        }

        Ok(())
    }
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply capture settings (resolution, fps, preferred pixel format).
fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}
