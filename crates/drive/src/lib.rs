//! Drive side of the rover: a fixed-rate control loop that turns manual
//! throttle/steer input into differential motor power.

pub mod apm;
mod control;
pub mod io;
mod mix;
mod timer;

pub use control::{ControlConfig, ControlLoop, DEFAULT_RATE_HZ, LoopStats, Tick};
pub use io::{
    DriveError, FixedInput, LoggingMotors, MotorDriver, RadioInput, SysfsPwmMotors, SysfsRcInput,
};
pub use mix::{ControlState, MotorCommand, mix};
pub use timer::{PacingTimer, pacing_sleep, period_for};
