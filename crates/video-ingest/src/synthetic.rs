use std::collections::VecDeque;

use handoff::CancelToken;

use crate::{CaptureError, Frame, FrameSink, FrameSource};

/// Plays back a fixed list of in-memory frames once.
pub struct SyntheticSource {
    width: i32,
    height: i32,
    frames: VecDeque<Frame>,
}

impl SyntheticSource {
    pub fn new(width: i32, height: i32, frames: Vec<Frame>) -> Self {
        Self {
            width,
            height,
            frames: frames.into(),
        }
    }
}

impl FrameSource for SyntheticSource {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn run(&mut self, sink: &FrameSink, cancel: &CancelToken) -> Result<(), CaptureError> {
        while let Some(frame) = self.frames.pop_front() {
            if cancel.is_cancelled() || !sink.push(frame) {
                break;
            }
        }
        Ok(())
    }
}
