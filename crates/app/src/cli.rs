use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use drive::DEFAULT_RATE_HZ;
use vision::{PipelineArgs, PipelineConfig};

/// Where throttle and steer come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RadioBackend {
    /// Constant values from `--throttle` / `--steer`.
    Fixed,
    /// RC receiver channels from the rcio kernel driver.
    Rcio,
}

/// Where motor power goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MotorBackend {
    /// Log commands only.
    Log,
    /// Kernel PWM outputs driving the ESCs.
    Pwm,
}

/// Steer a small ground vehicle along a coloured guide line.
#[derive(Debug, Parser)]
#[command(name = "rover", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Control loop rate.
    #[arg(long = "rate", value_name = "HZ", default_value_t = DEFAULT_RATE_HZ)]
    pub rate_hz: u32,
    /// Manual input backend.
    #[arg(long = "radio", value_enum, default_value_t = RadioBackend::Fixed)]
    pub radio: RadioBackend,
    /// Motor output backend.
    #[arg(long = "motors", value_enum, default_value_t = MotorBackend::Log)]
    pub motors: MotorBackend,
    /// Throttle for the fixed radio backend (-1..1).
    #[arg(long = "throttle", default_value_t = 0.0, allow_negative_numbers = true)]
    pub throttle: f32,
    /// Steer for the fixed radio backend (-1..1).
    #[arg(long = "steer", default_value_t = 0.0, allow_negative_numbers = true)]
    pub steer: f32,
    /// Start even if an autopilot process appears to be running.
    #[arg(long = "skip-apm-check", action = clap::ArgAction::SetTrue)]
    pub skip_apm_check: bool,
}

#[derive(Clone, Debug)]
pub struct DriveConfig {
    pub rate_hz: u32,
    pub radio: RadioBackend,
    pub motors: MotorBackend,
    pub throttle: f32,
    pub steer: f32,
    pub check_apm: bool,
}

#[derive(Clone, Debug)]
pub struct RoverConfig {
    pub pipeline: PipelineConfig,
    pub drive: DriveConfig,
}

impl TryFrom<Cli> for RoverConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self> {
        if cli.rate_hz == 0 {
            bail!("--rate must be at least 1");
        }
        for (flag, value) in [("--throttle", cli.throttle), ("--steer", cli.steer)] {
            if !(-1.0..=1.0).contains(&value) {
                bail!("{flag} must be between -1 and 1");
            }
        }
        if cli.radio == RadioBackend::Rcio && (cli.throttle != 0.0 || cli.steer != 0.0) {
            bail!("--throttle and --steer only apply to the fixed radio backend");
        }

        let pipeline = PipelineConfig::try_from(cli.pipeline)?;
        Ok(Self {
            pipeline,
            drive: DriveConfig {
                rate_hz: cli.rate_hz,
                radio: cli.radio,
                motors: cli.motors,
                throttle: cli.throttle,
                steer: cli.steer,
                check_apm: !cli.skip_apm_check,
            },
        })
    }
}
