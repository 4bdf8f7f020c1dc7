mod advisor;
mod cli;

use std::{ops::ControlFlow, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use drive::{
    ControlConfig, ControlLoop, FixedInput, LoggingMotors, MotorDriver, RadioInput, SysfsPwmMotors,
    SysfsRcInput,
};
use handoff::CancelToken;
use tracing::{info, warn};
use vision::{Pipeline, pipeline::telemetry};

use crate::{
    advisor::DirectionWatch,
    cli::{Cli, DriveConfig, MotorBackend, RadioBackend, RoverConfig},
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = RoverConfig::try_from(Cli::parse())?;
    let telemetry_guard = telemetry::enter_runtime(&config.pipeline.telemetry);
    if let Some(path) = telemetry_guard.chrome_trace_path() {
        info!("writing chrome trace to {}", path.display());
    }

    if config.drive.check_apm {
        match drive::apm::running_autopilot() {
            Ok(Some(name)) => bail!("{name} is running and owns the motor outputs; stop it first"),
            Ok(None) => {}
            Err(err) => warn!("could not scan for a running autopilot: {err}"),
        }
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || cancel.cancel()) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    }

    let radio = open_radio(&config.drive);
    let motors = open_motors(&config.drive)?;
    let pipeline = Pipeline::start(&config.pipeline, cancel.clone())?;

    info!("rover running, press Ctrl+C to stop");
    let output = pipeline.output();
    let mut watch = DirectionWatch::default();
    let mut control = ControlLoop::new(
        radio,
        motors,
        ControlConfig {
            rate_hz: config.drive.rate_hz,
            ..ControlConfig::default()
        },
    );
    let loop_result = control.run(&cancel, |_tick| {
        watch.observe(&output);
        match pipeline.capture_exit() {
            Some(Ok(())) => {
                info!("frame source finished");
                ControlFlow::Break(())
            }
            Some(Err(err)) => {
                warn!("capture stopped: {err}");
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    });

    if let Some(component) = pipeline.watchdog_reason() {
        warn!("watchdog stopped the rover: {component:?} stalled");
    }
    let shutdown_result = pipeline.shutdown();

    let stats = loop_result.context("Failed to park motors")?;
    info!(
        ticks = stats.ticks,
        radio_errors = stats.radio_errors,
        motor_errors = stats.motor_errors,
        last_direction = ?watch.last_direction(),
        "rover stopped"
    );
    shutdown_result
}

fn open_radio(config: &DriveConfig) -> Box<dyn RadioInput> {
    match config.radio {
        RadioBackend::Fixed => {
            info!(throttle = config.throttle, steer = config.steer, "using fixed radio input");
            Box::new(FixedInput::new(config.throttle, config.steer))
        }
        RadioBackend::Rcio => Box::new(SysfsRcInput::default()),
    }
}

fn open_motors(config: &DriveConfig) -> Result<Box<dyn MotorDriver>> {
    match config.motors {
        MotorBackend::Log => Ok(Box::new(LoggingMotors::new())),
        MotorBackend::Pwm => {
            let motors = SysfsPwmMotors::open_default().context("Failed to open PWM outputs")?;
            // let the ESCs arm on the neutral pulse
            std::thread::sleep(Duration::from_millis(100));
            Ok(Box::new(motors))
        }
    }
}
