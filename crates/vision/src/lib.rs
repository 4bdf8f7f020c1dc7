//! Guide-line vision for the rover.
//!
//! Frames are converted to L*a*b*, segmented with one of two strategies, and
//! the longest resulting lines decide whether the vehicle should turn, go
//! straight or back off. [`pipeline`] wires this worker between the capture
//! source, the frame logger and the stall watchdog.

mod annotation;
pub mod color;
pub mod compute;
pub mod direction;
pub mod output;
pub mod pipeline;
pub mod segment;

pub use compute::{ComputeConfig, ThresholdStats, VisionWorker, process_frame};
pub use direction::{Decision, Direction, Guide};
pub use output::{OutputData, SharedOutput, shared_output};
pub use pipeline::{
    Pipeline,
    config::{PipelineArgs, PipelineConfig, SourceKind, TelemetryOptions},
};
pub use segment::{DetectedLine, Geometry, Segmentation};
