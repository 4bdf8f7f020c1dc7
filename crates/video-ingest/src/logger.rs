//! Offline frame logger fed through a small side queue.
//!
//! The vision worker offers every Nth frame with a non-blocking enqueue, so a
//! slow disk only ever costs dropped log frames, never pipeline latency.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use handoff::{BoundedQueue, Worker, WorkerError};
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::Frame;

const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to create log directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame is empty or malformed")]
    EmptyFrame,
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Directory receiving `frame-<seq>.jpg` files.
    pub dir: PathBuf,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Capacity of the side queue the vision worker feeds.
    pub queue_capacity: usize,
}

/// Handle to the logging worker and its input queue.
pub struct FrameLogger {
    queue: Arc<BoundedQueue<Frame>>,
    worker: Worker,
}

impl FrameLogger {
    /// Create the log directory and start the writer thread.
    ///
    /// `on_beat` is invoked on every loop iteration, busy or idle.
    pub fn start(
        config: LoggerConfig,
        on_beat: impl Fn() + Send + 'static,
    ) -> Result<Self, LoggerError> {
        fs::create_dir_all(&config.dir).map_err(|source| LoggerError::CreateDir {
            path: config.dir.clone(),
            source,
        })?;

        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let worker_queue = queue.clone();
        let worker = Worker::spawn("rover-logger", move || {
            let span = tracing::info_span!("logger.worker", dir = %config.dir.display());
            let _guard = span.enter();
            let mut seq: u64 = 0;
            loop {
                on_beat();
                match worker_queue.dequeue_timeout(IDLE_POLL) {
                    Some(frame) => {
                        let path = frame_path(&config.dir, seq);
                        seq += 1;
                        match write_jpeg(&frame, &path, config.jpeg_quality) {
                            Ok(()) => debug!("logged {}", path.display()),
                            Err(err) => warn!("frame log write failed: {err}"),
                        }
                    }
                    None if worker_queue.is_quitting() => break,
                    None => {}
                }
            }
            info!("frame logger wrote {seq} frame(s)");
        })?;

        let stop_queue = queue.clone();
        Ok(Self {
            queue,
            worker: worker.on_stop(move || stop_queue.quit()),
        })
    }

    /// Queue the vision worker samples frames into.
    pub fn queue(&self) -> Arc<BoundedQueue<Frame>> {
        self.queue.clone()
    }

    /// Quit the queue, let the writer drain it, and join the thread.
    pub fn stop(self) -> Result<(), LoggerError> {
        self.worker.join()?;
        Ok(())
    }
}

fn frame_path(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("frame-{seq:06}.jpg"))
}

/// Encode `frame` as a JPEG file at `path`.
pub(crate) fn write_jpeg(frame: &Frame, path: &Path, quality: u8) -> Result<(), LoggerError> {
    let rgb = frame.to_rgb_image().ok_or(LoggerError::EmptyFrame)?;
    let write_err = |source| LoggerError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|err| write_err(image::ImageError::IoError(err)))?;
    JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_drains_queue_to_numbered_jpegs() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("run");
        let logger = FrameLogger::start(
            LoggerConfig {
                dir: log_dir.clone(),
                jpeg_quality: 80,
                queue_capacity: 4,
            },
            || {},
        )
        .unwrap();

        let queue = logger.queue();
        for i in 0..3 {
            queue.enqueue(Frame::filled(16, 8, [0, 128, 255], i));
        }
        logger.stop().unwrap();

        for seq in 0..3 {
            let path = frame_path(&log_dir, seq);
            let decoded = image::open(&path).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (16, 8));
        }
        assert!(!frame_path(&log_dir, 3).exists());
    }

    #[test]
    fn malformed_frame_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jpg");
        let mut frame = Frame::filled(4, 4, [0, 0, 0], 0);
        frame.data.truncate(5);
        assert!(matches!(
            write_jpeg(&frame, &path, 90),
            Err(LoggerError::EmptyFrame)
        ));
        assert!(!path.exists());
    }
}
