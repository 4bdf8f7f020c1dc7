use std::sync::Arc;

use handoff::Exchange;
use video_ingest::Frame;

use crate::{
    direction::{Direction, Guide},
    segment::DetectedLine,
};

/// Everything the vision worker publishes for one frame.
#[derive(Clone, Debug)]
pub struct OutputData {
    /// Source frame with the processed rows shown as lightness and contours overlaid.
    pub image: Frame,
    /// Detected lines, longest first.
    pub lines: Vec<DetectedLine>,
    pub direction: Direction,
    /// Endpoints of the last line examined for the decision.
    pub guide: Option<Guide>,
    pub frame_number: u64,
    pub timestamp_ms: i64,
    /// Binarisation threshold, threshold segmentation only.
    pub threshold: Option<u8>,
}

/// Latest published result, empty until the first frame is processed.
pub type SharedOutput = Arc<Exchange<Option<Arc<OutputData>>>>;

pub fn shared_output() -> SharedOutput {
    Arc::new(Exchange::default())
}
