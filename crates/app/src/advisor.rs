use tracing::debug;
use vision::{Direction, SharedOutput};

/// Follows the published vision result from the control loop.
///
/// The decision is advisory: it is logged when it changes and never overrides
/// the manual input.
#[derive(Debug, Default)]
pub struct DirectionWatch {
    last_frame: Option<u64>,
    last_direction: Option<Direction>,
}

impl DirectionWatch {
    /// Look at the latest result; returns the direction if it changed.
    pub fn observe(&mut self, output: &SharedOutput) -> Option<Direction> {
        let latest = output.latest()?;
        if self.last_frame == Some(latest.frame_number) {
            return None;
        }
        self.last_frame = Some(latest.frame_number);
        if self.last_direction == Some(latest.direction) {
            return None;
        }
        self.last_direction = Some(latest.direction);
        debug!(
            frame = latest.frame_number,
            lines = latest.lines.len(),
            guide = ?latest.guide,
            "vision advises {}",
            latest.direction
        );
        Some(latest.direction)
    }

    pub fn last_direction(&self) -> Option<Direction> {
        self.last_direction
    }
}
