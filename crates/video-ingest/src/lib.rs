//! Frame acquisition and offline frame logging for the rover.
//!
//! Every source pushes fixed-size BGR frames into a [`BoundedQueue`] through a
//! [`FrameSink`]. [`spawn_capture`] runs a source on its own worker thread and
//! reports how it ended on a status channel.

use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use handoff::{BoundedQueue, CancelToken, Worker, WorkerError};
use tracing::{error, info};

#[cfg(feature = "opencv")]
mod camera;
mod ffmpeg;
mod logger;
mod replay;
mod synthetic;
mod types;

#[cfg(feature = "opencv")]
pub use camera::CameraSource;
pub use ffmpeg::FfmpegSource;
pub use logger::{FrameLogger, LoggerConfig, LoggerError};
pub use replay::DirectorySource;
pub use synthetic::SyntheticSource;
pub use types::{CaptureError, Frame, FrameFormat};

/// Producer of frames with a geometry agreed before capture starts.
pub trait FrameSource: Send {
    fn width(&self) -> i32;
    fn height(&self) -> i32;

    /// Push frames into `sink` until the sink refuses them, `cancel` fires, or
    /// the source runs dry.
    fn run(&mut self, sink: &FrameSink, cancel: &CancelToken) -> Result<(), CaptureError>;
}

impl FrameSource for Box<dyn FrameSource> {
    fn width(&self) -> i32 {
        (**self).width()
    }

    fn height(&self) -> i32 {
        (**self).height()
    }

    fn run(&mut self, sink: &FrameSink, cancel: &CancelToken) -> Result<(), CaptureError> {
        (**self).run(sink, cancel)
    }
}

/// Write end of the frame queue handed to a [`FrameSource`].
pub struct FrameSink {
    queue: Arc<BoundedQueue<Frame>>,
    on_frame: Box<dyn Fn() + Send>,
}

impl FrameSink {
    pub fn new(queue: Arc<BoundedQueue<Frame>>, on_frame: impl Fn() + Send + 'static) -> Self {
        Self {
            queue,
            on_frame: Box::new(on_frame),
        }
    }

    /// Blocking push; returns `false` once the queue is quitting.
    pub fn push(&self, frame: Frame) -> bool {
        (self.on_frame)();
        self.queue.enqueue(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_quitting()
    }
}

/// Running capture worker plus the channel it reports its exit status on.
pub struct CaptureHandle {
    worker: Worker,
    status: Receiver<Result<(), CaptureError>>,
}

impl CaptureHandle {
    /// Exit status of the source if it has already finished.
    pub fn poll_exit(&self) -> Option<Result<(), CaptureError>> {
        match self.status.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Ok(())),
        }
    }

    /// Quit the frame queue and wait for the capture thread.
    pub fn stop(self) -> Result<(), WorkerError> {
        self.worker.join()
    }
}

/// Run `source` on a dedicated thread feeding `queue`.
///
/// Stopping the returned handle quits `queue`, which also lets the consumer on
/// the other end drain and exit.
pub fn spawn_capture<S>(
    mut source: S,
    queue: Arc<BoundedQueue<Frame>>,
    cancel: CancelToken,
    on_frame: impl Fn() + Send + 'static,
) -> Result<CaptureHandle, WorkerError>
where
    S: FrameSource + 'static,
{
    let (status_tx, status_rx) = bounded(1);
    let sink = FrameSink::new(queue.clone(), on_frame);

    let worker = Worker::spawn("rover-capture", move || {
        let span = tracing::info_span!(
            "capture.worker",
            width = source.width(),
            height = source.height()
        );
        let _guard = span.enter();
        let result = source.run(&sink, &cancel);
        match &result {
            Ok(()) => info!("capture finished"),
            Err(err) => error!("capture failed: {err}"),
        }
        let _ = status_tx.send(result);
    })?;

    Ok(CaptureHandle {
        worker: worker.on_stop(move || queue.quit()),
        status: status_rx,
    })
}
