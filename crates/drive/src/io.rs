//! Radio input and motor output backends.
//!
//! The sysfs backends target the Navio RC input driver
//! (`/sys/kernel/rcio/rcin/ch<N>`, pulse width in microseconds) and the
//! kernel PWM class (`/sys/class/pwm/pwmchip0/pwm<N>`, times in nanoseconds).

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::mix::MotorCommand;

pub const RCIO_ROOT: &str = "/sys/kernel/rcio/rcin";
pub const PWM_CHIP_ROOT: &str = "/sys/class/pwm/pwmchip0";

/// Pulse widths of the servo-style signal, in microseconds.
pub const PULSE_MIN_US: f32 = 1000.0;
pub const PULSE_MID_US: f32 = 1500.0;
pub const PULSE_MAX_US: f32 = 2000.0;

/// 50 Hz servo frame.
const PWM_PERIOD_NS: u64 = 20_000_000;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected value {value:?} in {path:?}")]
    Parse { path: PathBuf, value: String },
    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Manual control source.
pub trait RadioInput: Send {
    /// Throttle in `[-1, 1]`.
    fn read_throttle(&mut self) -> Result<f32, DriveError>;
    /// Steer in `[-1, 1]`, positive to the right.
    fn read_steer(&mut self) -> Result<f32, DriveError>;
}

/// Left/right motor actuation.
pub trait MotorDriver: Send {
    fn set_left(&mut self, power: f32) -> Result<(), DriveError>;
    fn set_right(&mut self, power: f32) -> Result<(), DriveError>;

    fn apply(&mut self, command: MotorCommand) -> Result<(), DriveError> {
        self.set_left(command.left)?;
        self.set_right(command.right)
    }
}

impl<T: RadioInput + ?Sized> RadioInput for Box<T> {
    fn read_throttle(&mut self) -> Result<f32, DriveError> {
        (**self).read_throttle()
    }

    fn read_steer(&mut self) -> Result<f32, DriveError> {
        (**self).read_steer()
    }
}

impl<T: MotorDriver + ?Sized> MotorDriver for Box<T> {
    fn set_left(&mut self, power: f32) -> Result<(), DriveError> {
        (**self).set_left(power)
    }

    fn set_right(&mut self, power: f32) -> Result<(), DriveError> {
        (**self).set_right(power)
    }
}

/// Constant input, for bench runs without a receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FixedInput {
    pub throttle: f32,
    pub steer: f32,
}

impl FixedInput {
    pub fn new(throttle: f32, steer: f32) -> Self {
        Self { throttle, steer }
    }
}

impl RadioInput for FixedInput {
    fn read_throttle(&mut self) -> Result<f32, DriveError> {
        Ok(self.throttle)
    }

    fn read_steer(&mut self) -> Result<f32, DriveError> {
        Ok(self.steer)
    }
}

/// Motor driver that only records and logs what it is told.
#[derive(Debug, Default)]
pub struct LoggingMotors {
    last: MotorCommand,
    writes: u64,
}

impl LoggingMotors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> MotorCommand {
        self.last
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl MotorDriver for LoggingMotors {
    fn set_left(&mut self, power: f32) -> Result<(), DriveError> {
        if power != self.last.left {
            debug!(power, "left motor");
        }
        self.last.left = power;
        self.writes += 1;
        Ok(())
    }

    fn set_right(&mut self, power: f32) -> Result<(), DriveError> {
        if power != self.last.right {
            debug!(power, "right motor");
        }
        self.last.right = power;
        self.writes += 1;
        Ok(())
    }
}

/// Map an RC pulse width to `[-1, 1]`, clamped.
pub fn pulse_to_unit(pulse_us: f32) -> f32 {
    ((pulse_us - PULSE_MID_US) / (PULSE_MID_US - PULSE_MIN_US)).clamp(-1.0, 1.0)
}

/// Map motor power in `[-1, 1]` to a pulse width, clamped.
pub fn unit_to_pulse(power: f32) -> f32 {
    let power = if power.is_nan() { 0.0 } else { power.clamp(-1.0, 1.0) };
    PULSE_MID_US + power * (PULSE_MAX_US - PULSE_MID_US)
}

/// RC receiver channels exposed by the rcio kernel driver.
#[derive(Clone, Debug)]
pub struct SysfsRcInput {
    throttle: PathBuf,
    steer: PathBuf,
}

impl SysfsRcInput {
    pub const DEFAULT_THROTTLE_CHANNEL: u32 = 2;
    pub const DEFAULT_STEER_CHANNEL: u32 = 0;

    pub fn new(root: impl AsRef<Path>, throttle_channel: u32, steer_channel: u32) -> Self {
        let root = root.as_ref();
        Self {
            throttle: root.join(format!("ch{throttle_channel}")),
            steer: root.join(format!("ch{steer_channel}")),
        }
    }

    fn read_channel(path: &Path) -> Result<f32, DriveError> {
        let raw = fs::read_to_string(path).map_err(|source| DriveError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let pulse: f32 = raw.trim().parse().map_err(|_| DriveError::Parse {
            path: path.to_path_buf(),
            value: raw.trim().to_string(),
        })?;
        Ok(pulse_to_unit(pulse))
    }
}

impl Default for SysfsRcInput {
    fn default() -> Self {
        Self::new(
            RCIO_ROOT,
            Self::DEFAULT_THROTTLE_CHANNEL,
            Self::DEFAULT_STEER_CHANNEL,
        )
    }
}

impl RadioInput for SysfsRcInput {
    fn read_throttle(&mut self) -> Result<f32, DriveError> {
        Self::read_channel(&self.throttle)
    }

    fn read_steer(&mut self) -> Result<f32, DriveError> {
        Self::read_channel(&self.steer)
    }
}

/// Two PWM outputs driving ESCs with servo pulses.
#[derive(Clone, Debug)]
pub struct SysfsPwmMotors {
    left: PathBuf,
    right: PathBuf,
}

impl SysfsPwmMotors {
    pub const DEFAULT_LEFT_CHANNEL: u32 = 0;
    pub const DEFAULT_RIGHT_CHANNEL: u32 = 1;

    /// Export and enable both channels under `chip`, starting at neutral.
    pub fn open(chip: impl AsRef<Path>, left: u32, right: u32) -> Result<Self, DriveError> {
        let chip = chip.as_ref();
        let left = init_channel(chip, left)?;
        let right = init_channel(chip, right)?;
        info!("pwm motors on {} and {}", left.display(), right.display());
        Ok(Self { left, right })
    }

    pub fn open_default() -> Result<Self, DriveError> {
        Self::open(
            PWM_CHIP_ROOT,
            Self::DEFAULT_LEFT_CHANNEL,
            Self::DEFAULT_RIGHT_CHANNEL,
        )
    }

    fn write_power(channel: &Path, power: f32) -> Result<(), DriveError> {
        let duty_ns = (unit_to_pulse(power) * 1000.0).round() as u64;
        write_value(&channel.join("duty_cycle"), duty_ns)
    }
}

impl MotorDriver for SysfsPwmMotors {
    fn set_left(&mut self, power: f32) -> Result<(), DriveError> {
        Self::write_power(&self.left, power)
    }

    fn set_right(&mut self, power: f32) -> Result<(), DriveError> {
        Self::write_power(&self.right, power)
    }
}

fn init_channel(chip: &Path, index: u32) -> Result<PathBuf, DriveError> {
    let channel = chip.join(format!("pwm{index}"));
    if !channel.exists() {
        write_value(&chip.join("export"), index)?;
    }
    write_value(&channel.join("period"), PWM_PERIOD_NS)?;
    write_value(
        &channel.join("duty_cycle"),
        (PULSE_MID_US * 1000.0) as u64,
    )?;
    write_value(&channel.join("enable"), 1)?;
    Ok(channel)
}

fn write_value(path: &Path, value: impl std::fmt::Display) -> Result<(), DriveError> {
    fs::write(path, value.to_string()).map_err(|source| DriveError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_mapping_is_linear_and_clamped() {
        assert_eq!(pulse_to_unit(1000.0), -1.0);
        assert_eq!(pulse_to_unit(1500.0), 0.0);
        assert_eq!(pulse_to_unit(2000.0), 1.0);
        assert_eq!(pulse_to_unit(1750.0), 0.5);
        assert_eq!(pulse_to_unit(900.0), -1.0);
        assert_eq!(pulse_to_unit(2300.0), 1.0);
    }

    #[test]
    fn power_maps_to_pulse() {
        assert_eq!(unit_to_pulse(-1.0), 1000.0);
        assert_eq!(unit_to_pulse(0.0), 1500.0);
        assert_eq!(unit_to_pulse(1.0), 2000.0);
        assert_eq!(unit_to_pulse(3.0), 2000.0);
        assert_eq!(unit_to_pulse(f32::NAN), 1500.0);
    }

    #[test]
    fn rc_input_reads_channels() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ch2"), "2000\n").unwrap();
        fs::write(dir.path().join("ch0"), "1250\n").unwrap();
        let mut rc = SysfsRcInput::new(dir.path(), 2, 0);
        assert_eq!(rc.read_throttle().unwrap(), 1.0);
        assert_eq!(rc.read_steer().unwrap(), -0.5);
    }

    #[test]
    fn rc_input_reports_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ch2"), "garbage").unwrap();
        let mut rc = SysfsRcInput::new(dir.path(), 2, 0);
        assert!(matches!(rc.read_throttle(), Err(DriveError::Parse { .. })));
        assert!(matches!(rc.read_steer(), Err(DriveError::Read { .. })));
    }

    #[test]
    fn pwm_motors_write_duty_cycle() {
        let chip = tempfile::tempdir().unwrap();
        for index in 0..2 {
            fs::create_dir(chip.path().join(format!("pwm{index}"))).unwrap();
        }
        let mut motors = SysfsPwmMotors::open(chip.path(), 0, 1).unwrap();
        let read = |name: &str| fs::read_to_string(chip.path().join(name)).unwrap();
        assert_eq!(read("pwm0/period"), "20000000");
        assert_eq!(read("pwm0/enable"), "1");
        assert_eq!(read("pwm1/duty_cycle"), "1500000");

        motors
            .apply(MotorCommand {
                left: 1.0,
                right: -0.5,
            })
            .unwrap();
        assert_eq!(read("pwm0/duty_cycle"), "2000000");
        assert_eq!(read("pwm1/duty_cycle"), "1250000");
    }

    #[test]
    fn pwm_export_failure_is_reported() {
        let missing = Path::new("/nonexistent/pwmchip0");
        assert!(matches!(
            SysfsPwmMotors::open(missing, 0, 1),
            Err(DriveError::Write { .. })
        ));
    }

    #[test]
    fn logging_motors_remember_last_command() {
        let mut motors = LoggingMotors::new();
        motors
            .apply(MotorCommand {
                left: 0.25,
                right: 0.75,
            })
            .unwrap();
        assert_eq!(
            motors.last(),
            MotorCommand {
                left: 0.25,
                right: 0.75
            }
        );
        assert_eq!(motors.writes(), 2);
    }
}
