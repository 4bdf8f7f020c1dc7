//! The paced control loop: read the radio, mix, drive the motors.

use std::{ops::ControlFlow, thread, time::Duration};

use handoff::CancelToken;
use tracing::{debug, info, warn};

use crate::{
    io::{DriveError, MotorDriver, RadioInput},
    mix::{ControlState, MotorCommand, mix},
    timer::PacingTimer,
};

pub const DEFAULT_RATE_HZ: u32 = 30;

#[derive(Clone, Copy, Debug)]
pub struct ControlConfig {
    pub rate_hz: u32,
    /// Upper bound on any single sleep.
    pub max_sleep: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_RATE_HZ,
            max_sleep: Duration::from_micros(i32::MAX as u64),
        }
    }
}

/// What happened on one tick, handed to the caller's hook.
#[derive(Clone, Copy, Debug)]
pub struct Tick {
    pub index: u64,
    pub state: ControlState,
    pub command: MotorCommand,
}

/// Summary returned when the loop ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub radio_errors: u64,
    pub motor_errors: u64,
}

pub struct ControlLoop<R, M> {
    radio: R,
    motors: M,
    config: ControlConfig,
}

impl<R: RadioInput, M: MotorDriver> ControlLoop<R, M> {
    pub fn new(radio: R, motors: M, config: ControlConfig) -> Self {
        Self {
            radio,
            motors,
            config,
        }
    }

    pub fn motors(&self) -> &M {
        &self.motors
    }

    /// Run until `cancel` fires or `on_tick` breaks, then stop both motors.
    ///
    /// Radio and motor errors during the loop are logged and counted. An error
    /// while stopping the motors at the end is returned.
    pub fn run(
        &mut self,
        cancel: &CancelToken,
        mut on_tick: impl FnMut(&Tick) -> ControlFlow<()>,
    ) -> Result<LoopStats, DriveError> {
        let span = tracing::info_span!("control.loop", rate_hz = self.config.rate_hz);
        let _guard = span.enter();
        info!("control loop running");

        let mut stats = LoopStats::default();
        let mut radio_failing = false;
        let mut motors_failing = false;
        let mut timer = PacingTimer::start();

        while !cancel.is_cancelled() {
            let state = match self.read_state() {
                Ok(state) => {
                    if radio_failing {
                        info!("radio input recovered");
                        radio_failing = false;
                    }
                    state
                }
                Err(err) => {
                    stats.radio_errors += 1;
                    if !radio_failing {
                        warn!("radio read failed, holding neutral: {err}");
                        radio_failing = true;
                    }
                    ControlState::default()
                }
            };

            let command = mix(state);
            match self.motors.apply(command) {
                Ok(()) => motors_failing = false,
                Err(err) => {
                    stats.motor_errors += 1;
                    if !motors_failing {
                        warn!("motor write failed: {err}");
                        motors_failing = true;
                    }
                }
            }

            let tick = Tick {
                index: stats.ticks,
                state,
                command,
            };
            stats.ticks += 1;
            if on_tick(&tick).is_break() {
                debug!(tick = tick.index, "control loop asked to stop");
                break;
            }

            let sleep = timer.next_sleep(self.config.rate_hz, self.config.max_sleep);
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
        }

        info!(ticks = stats.ticks, "control loop stopped, parking motors");
        self.motors.apply(MotorCommand::STOP)?;
        Ok(stats)
    }

    fn read_state(&mut self) -> Result<ControlState, DriveError> {
        let throttle = self.radio.read_throttle()?;
        let steer = self.radio.read_steer()?;
        Ok(ControlState::new(throttle, steer).clamped())
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Instant};

    use super::*;
    use crate::io::{FixedInput, LoggingMotors};

    struct BrokenRadio;

    impl RadioInput for BrokenRadio {
        fn read_throttle(&mut self) -> Result<f32, DriveError> {
            Err(DriveError::Parse {
                path: PathBuf::from("ch2"),
                value: "x".into(),
            })
        }

        fn read_steer(&mut self) -> Result<f32, DriveError> {
            Ok(0.0)
        }
    }

    fn fast() -> ControlConfig {
        ControlConfig {
            rate_hz: 200,
            ..ControlConfig::default()
        }
    }

    #[test]
    fn loop_drives_then_parks_motors() {
        let mut control = ControlLoop::new(FixedInput::new(1.0, 0.5), LoggingMotors::new(), fast());
        let cancel = CancelToken::new();
        let mut seen = Vec::new();
        let stats = control
            .run(&cancel, |tick| {
                seen.push(tick.command);
                if tick.index == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(stats.ticks, 3);
        assert!(seen.iter().all(|c| *c == MotorCommand { left: 0.0, right: 1.0 }));
        assert_eq!(control.motors().last(), MotorCommand::STOP);
        assert_eq!(control.motors().writes(), 8);
    }

    #[test]
    fn cancelled_token_skips_loop_but_still_parks() {
        let mut control = ControlLoop::new(FixedInput::new(1.0, 0.0), LoggingMotors::new(), fast());
        let cancel = CancelToken::new();
        cancel.cancel();
        let stats = control.run(&cancel, |_| ControlFlow::Continue(())).unwrap();
        assert_eq!(stats.ticks, 0);
        assert_eq!(control.motors().writes(), 2);
    }

    #[test]
    fn input_is_clamped_before_mixing() {
        let mut control = ControlLoop::new(FixedInput::new(3.0, 0.0), LoggingMotors::new(), fast());
        let cancel = CancelToken::new();
        let mut first = None;
        control
            .run(&cancel, |tick| {
                first = Some(tick.command);
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(first, Some(MotorCommand { left: 1.0, right: 1.0 }));
    }

    #[test]
    fn radio_errors_hold_neutral() {
        let mut control = ControlLoop::new(BrokenRadio, LoggingMotors::new(), fast());
        let cancel = CancelToken::new();
        let stats = control
            .run(&cancel, |tick| {
                assert_eq!(tick.command, MotorCommand::STOP);
                if tick.index == 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(stats.radio_errors, 2);
    }

    #[test]
    fn loop_is_paced() {
        let config = ControlConfig {
            rate_hz: 50,
            ..ControlConfig::default()
        };
        let mut control = ControlLoop::new(FixedInput::default(), LoggingMotors::new(), config);
        let cancel = CancelToken::new();
        let started = Instant::now();
        control
            .run(&cancel, |tick| {
                if tick.index == 5 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        // five full periods of 20 ms separate six ticks
        assert!(started.elapsed() >= Duration::from_millis(90), "{:?}", started.elapsed());
    }
}
