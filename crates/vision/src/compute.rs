//! Vision worker: turns queued frames into published steering advice.

use std::sync::Arc;

use handoff::{BoundedQueue, TryEnqueueError, Worker, WorkerError};
use tracing::{debug, info, trace, warn};
use video_ingest::Frame;

use crate::{
    annotation::{CONTOUR_BGR, draw_contours, paint_lightness},
    color::LabImage,
    direction::{Direction, decide, sort_by_length},
    output::{OutputData, SharedOutput},
    segment::{Geometry, Segmentation},
};

/// Every Nth dequeued frame is offered to the frame logger.
pub const LOG_EVERY: u64 = 5;

#[derive(Clone, Copy, Debug)]
pub struct ComputeConfig {
    pub geometry: Geometry,
    pub segmentation: Segmentation,
    pub log_every: u64,
    /// Log the binarisation threshold of every frame with a usable line.
    pub calibrate: bool,
}

impl ComputeConfig {
    pub fn new(width: i32, height: i32, segmentation: Segmentation) -> Self {
        Self {
            geometry: Geometry::new(width, height),
            segmentation,
            log_every: LOG_EVERY,
            calibrate: false,
        }
    }
}

/// Run segmentation, the direction decision and annotation on one frame.
pub fn process_frame(
    frame: Frame,
    config: &ComputeConfig,
    frame_number: u64,
) -> OutputData {
    let geometry = config.geometry;
    let lab = LabImage::from_frame_rows(&frame, geometry.height / 2);
    let mut segmented = config.segmentation.run(&lab, geometry);
    sort_by_length(&mut segmented.lines);
    let decision = decide(&segmented.lines, geometry);

    let timestamp_ms = frame.timestamp_ms;
    let mut image = frame;
    paint_lightness(&mut image, &lab);
    draw_contours(&mut image, &segmented.contours, CONTOUR_BGR);

    OutputData {
        image,
        lines: segmented.lines,
        direction: decision.direction,
        guide: decision.guide,
        frame_number,
        timestamp_ms,
        threshold: segmented.threshold,
    }
}

/// Running mean of the thresholds chosen on frames with a usable line.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThresholdStats {
    total: f64,
    frames: u64,
}

impl ThresholdStats {
    pub fn record(&mut self, threshold: u8) {
        self.total += threshold as f64;
        self.frames += 1;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn average(&self) -> Option<f64> {
        (self.frames > 0).then(|| self.total / self.frames as f64)
    }
}

/// Handle to the background vision thread.
pub struct VisionWorker {
    worker: Worker,
}

impl VisionWorker {
    /// Start consuming `frames`. Quitting that queue (or stopping this handle)
    /// ends the loop once the queue has drained.
    pub fn spawn(
        config: ComputeConfig,
        frames: Arc<BoundedQueue<Frame>>,
        log_queue: Option<Arc<BoundedQueue<Frame>>>,
        output: SharedOutput,
        on_frame: impl Fn() + Send + 'static,
    ) -> Result<Self, WorkerError> {
        let worker_frames = frames.clone();
        let worker = Worker::spawn("rover-vision", move || {
            let span = tracing::info_span!(
                "vision.worker",
                strategy = config.segmentation.label(),
                width = config.geometry.width,
                height = config.geometry.height
            );
            let _guard = span.enter();
            run_loop(
                &config,
                &worker_frames,
                log_queue.as_deref(),
                &output,
                on_frame,
            );
        })?;
        Ok(Self {
            worker: worker.on_stop(move || frames.quit()),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Quit the frame queue and wait for the worker to drain it.
    pub fn stop(self) -> Result<(), WorkerError> {
        self.worker.join()
    }
}

fn run_loop(
    config: &ComputeConfig,
    frames: &BoundedQueue<Frame>,
    log_queue: Option<&BoundedQueue<Frame>>,
    output: &SharedOutput,
    on_frame: impl Fn(),
) {
    let geometry = config.geometry;
    let mut stats = ThresholdStats::default();
    let mut last_direction = None;
    let mut processed: u64 = 0;

    let mut index: u64 = 0;
    while let Some(frame) = frames.dequeue() {
        let frame_number = index;
        index += 1;

        if frame.is_empty() {
            trace!(frame_number, "skipping empty frame");
            continue;
        }
        let expected = frame.width == geometry.width && frame.height == geometry.height;
        debug_assert!(
            expected,
            "frame {}x{} does not match configured {}x{}",
            frame.width,
            frame.height,
            geometry.width,
            geometry.height
        );
        if !expected {
            warn!(
                frame_number,
                "frame is {}x{}, expected {}x{}; skipped",
                frame.width,
                frame.height,
                geometry.width,
                geometry.height
            );
            continue;
        }

        if let Some(log) = log_queue {
            if config.log_every > 0 && frame_number % config.log_every == 0 {
                match log.try_enqueue(frame.clone()) {
                    Ok(()) => {}
                    Err(TryEnqueueError::Full(_)) => trace!(frame_number, "log queue full"),
                    Err(TryEnqueueError::Quitting(_)) => {}
                }
            }
        }

        let out = {
            let _frame_span = tracing::debug_span!("vision.frame", frame = frame_number).entered();
            process_frame(frame, config, frame_number)
        };
        processed += 1;
        on_frame();

        if out.direction != Direction::GoBack {
            if let Some(threshold) = out.threshold {
                stats.record(threshold);
                if config.calibrate {
                    info!(frame_number, threshold, "threshold");
                }
            }
        }
        if last_direction != Some(out.direction) {
            debug!(frame_number, lines = out.lines.len(), "direction {}", out.direction);
            last_direction = Some(out.direction);
        }

        output.swap(Some(Arc::new(out)));
    }

    if let Some(average) = stats.average() {
        info!("average threshold: {average:.1} over {} frame(s)", stats.frames());
    }
    info!("vision worker processed {processed} frame(s)");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::output::shared_output;

    const W: i32 = 160;
    const H: i32 = 120;
    const GREY: [u8; 3] = [200, 200, 200];
    const BLUE: [u8; 3] = [150, 30, 30];

    fn frame_with_line(from: (i32, i32), to: (i32, i32), timestamp_ms: i64) -> Frame {
        let mut frame = Frame::filled(W, H, GREY, timestamp_ms);
        let (ax, ay) = (from.0 as f64, from.1 as f64);
        let (bx, by) = (to.0 as f64, to.1 as f64);
        let len2 = (bx - ax).powi(2) + (by - ay).powi(2);
        for y in 0..H {
            for x in 0..W {
                let (px, py) = (x as f64, y as f64);
                let t = (((px - ax) * (bx - ax) + (py - ay) * (by - ay)) / len2).clamp(0.0, 1.0);
                let (cx, cy) = (ax + t * (bx - ax), ay + t * (by - ay));
                if (px - cx).powi(2) + (py - cy).powi(2) <= 2.5 * 2.5 {
                    frame.set_pixel(x, y, BLUE);
                }
            }
        }
        frame
    }

    fn config(segmentation: Segmentation) -> ComputeConfig {
        ComputeConfig::new(W, H, segmentation)
    }

    #[test]
    fn line_crossing_centre_turns() {
        let frame = frame_with_line((40, 2), (120, 58), 7);
        let out = process_frame(frame, &config(Segmentation::Threshold), 3);
        assert_eq!(out.direction, Direction::Turn);
        assert_eq!(out.frame_number, 3);
        assert_eq!(out.timestamp_ms, 7);
        assert!(out.threshold.is_some());
        let guide = out.guide.unwrap();
        assert!(guide.lo.x < W / 2 && guide.hi.x > W / 2, "{guide:?}");
        assert!(guide.hi.y > H / 20);
    }

    #[test]
    fn line_beside_centre_goes_straight() {
        let frame = frame_with_line((100, 2), (130, 58), 0);
        let out = process_frame(frame, &config(Segmentation::Threshold), 0);
        assert_eq!(out.direction, Direction::GoStraight);
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn blank_frame_goes_back() {
        let frame = Frame::filled(W, H, GREY, 0);
        let out = process_frame(frame, &config(Segmentation::Threshold), 0);
        assert_eq!(out.direction, Direction::GoBack);
        assert!(out.lines.is_empty());
        assert!(out.guide.is_none());
    }

    #[test]
    fn lines_are_sorted_longest_first() {
        let mut frame = frame_with_line((100, 2), (130, 58), 0);
        for x in 10..14 {
            for y in 10..55 {
                frame.set_pixel(x, y, BLUE);
            }
        }
        let out = process_frame(frame, &config(Segmentation::Threshold), 0);
        assert_eq!(out.lines.len(), 2);
        assert!(out.lines[0].length_squared() >= out.lines[1].length_squared());
    }

    #[test]
    fn annotation_greys_top_half_and_keeps_bottom() {
        let frame = frame_with_line((40, 2), (120, 58), 0);
        let out = process_frame(frame, &config(Segmentation::Threshold), 0);
        let [b, g, r] = out.image.pixel(5, 40);
        assert!(b == g && g == r, "top half should be grey");
        assert_eq!(out.image.pixel(5, H - 1), GREY);
        let green = (0..H / 2)
            .flat_map(|y| (0..W).map(move |x| (x, y)))
            .filter(|&(x, y)| out.image.pixel(x, y) == CONTOUR_BGR)
            .count();
        assert!(green > 0, "contours should be drawn");
    }

    #[test]
    fn edge_strategy_turns_on_crossing_line() {
        let frame = frame_with_line((40, 2), (120, 58), 0);
        let out = process_frame(frame, &config(Segmentation::Edge), 0);
        assert!(out.threshold.is_none());
        assert!(!out.lines.is_empty());
        assert_eq!(out.direction, Direction::Turn);
    }

    #[test]
    fn threshold_stats_average_recorded_values() {
        let mut stats = ThresholdStats::default();
        assert_eq!(stats.average(), None);
        stats.record(100);
        stats.record(110);
        assert_eq!(stats.average(), Some(105.0));
        assert_eq!(stats.frames(), 2);
    }

    #[test]
    fn worker_drains_queue_publishes_and_samples_log() {
        let frames = Arc::new(BoundedQueue::new(16));
        for i in 0..8 {
            assert!(frames.enqueue(frame_with_line((40, 2), (120, 58), i)));
        }
        frames.enqueue(Frame::filled(0, 0, GREY, 99));
        frames.quit();

        let log = Arc::new(BoundedQueue::new(4));
        let output = shared_output();
        let beats = Arc::new(AtomicUsize::new(0));
        let worker = {
            let beats = beats.clone();
            VisionWorker::spawn(
                config(Segmentation::Threshold),
                frames.clone(),
                Some(log.clone()),
                output.clone(),
                move || {
                    beats.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap()
        };
        worker.stop().unwrap();

        assert!(frames.is_empty());
        assert_eq!(beats.load(Ordering::SeqCst), 8);
        // frames 0 and 5 are sampled
        assert_eq!(log.len(), 2);
        let logged = log.dequeue().unwrap();
        assert_eq!(logged.timestamp_ms, 0);
        assert_eq!(logged.pixel(0, 0), GREY, "logged frame must be raw");

        let latest = output.latest().unwrap();
        assert_eq!(latest.frame_number, 7);
        assert_eq!(latest.direction, Direction::Turn);
    }

    #[test]
    fn full_log_queue_never_blocks_the_worker() {
        let frames = Arc::new(BoundedQueue::new(16));
        for i in 0..11 {
            frames.enqueue(Frame::filled(W, H, GREY, i));
        }
        frames.quit();
        let log = Arc::new(BoundedQueue::new(1));
        let output = shared_output();
        let worker = VisionWorker::spawn(
            config(Segmentation::Threshold),
            frames,
            Some(log.clone()),
            output.clone(),
            || {},
        )
        .unwrap();
        worker.stop().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(output.latest().unwrap().frame_number, 10);
    }
}
