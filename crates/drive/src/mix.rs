/// Manual control input for one tick, both axes in `[-1, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlState {
    pub throttle: f32,
    /// Positive steers right.
    pub steer: f32,
}

impl ControlState {
    pub fn new(throttle: f32, steer: f32) -> Self {
        Self { throttle, steer }
    }

    /// Clamp both axes into `[-1, 1]`; NaN becomes 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        Self {
            throttle: clamp(self.throttle),
            steer: clamp(self.steer),
        }
    }
}

/// Power for each side of the vehicle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotorCommand {
    pub left: f32,
    pub right: f32,
}

impl MotorCommand {
    pub const STOP: MotorCommand = MotorCommand {
        left: 0.0,
        right: 0.0,
    };
}

/// Differential mix: the inner wheel slows down, and reverses once
/// `|steer|` passes 0.5, so the vehicle can pivot in place at full lock.
pub fn mix(state: ControlState) -> MotorCommand {
    let ControlState { throttle, steer } = state;
    let left = if steer > 0.0 {
        (1.0 - 2.0 * steer) * throttle
    } else {
        throttle
    };
    let right = if steer < 0.0 {
        (1.0 + 2.0 * steer) * throttle
    } else {
        throttle
    };
    MotorCommand { left, right }
}
