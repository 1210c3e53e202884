//! Main entry point for the fan controller

use anyhow::Context;
use clap::Parser;
use log::{debug, error, info};
use std::process::ExitCode;
use syno_fan_control::{
    args::{Args, Commands},
    config::Config,
    dsm::DsmClient,
    logging,
    state::StateStore,
    temperature::{SensorVerdict, SysfsSource, SENSOR_MAX_CELSIUS, SENSOR_MIN_CELSIUS},
    FanController,
};

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    logging::setup(
        logging::level_for(args.verbose, args.quiet),
        args.log_file.as_deref(),
    )
    .context("failed to set up logging")?;

    // Build metadata for binary identity verification
    debug!(
        "syno-fan-control v{} (git {} / {}) built {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_HASH").unwrap_or("unknown"),
        option_env!("GIT_DESC").unwrap_or("unknown"),
        option_env!("BUILD_TIME").unwrap_or("unknown")
    );

    let config = Config::load(args.config.as_deref()).context("invalid configuration")?;

    match args.command() {
        Commands::Run => run(&config),
        Commands::State => show_state(&config).map(|()| ExitCode::SUCCESS),
        Commands::Classify { temp } => {
            println!("{:.1}°C -> {}", temp, config.thresholds.classify(*temp));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sensors => list_sensors(&config).map(|()| ExitCode::SUCCESS),
    }
}

/// One control cycle; fatal failures are logged once and become a non-zero exit
fn run(config: &Config) -> anyhow::Result<ExitCode> {
    let client = DsmClient::new(&config.dsm).context("failed to create DSM client")?;
    let controller = FanController::new(config, &client);

    match controller.run() {
        Ok(report) => {
            info!("[STATUS] {}", report);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Control cycle aborted: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn show_state(config: &Config) -> anyhow::Result<()> {
    let store = StateStore::new(&config.state.path, config.modes.clone());
    let state = store.load();

    println!("State file:   {}", store.path().display());
    println!(
        "Last mode:    {}",
        state
            .last_mode
            .map_or_else(|| "none".to_string(), |m| m.to_string())
    );
    println!("Last change:  {}", state.last_change_time);
    match (&state.last_temperature, &state.last_temperature_source) {
        (Some(temp), Some(source)) => println!("Last reading: {:.1}°C (from {})", temp, source),
        (Some(temp), None) => println!("Last reading: {:.1}°C", temp),
        _ => println!("Last reading: none"),
    }
    Ok(())
}

fn list_sensors(config: &Config) -> anyhow::Result<()> {
    let source = SysfsSource::new(&config.sensors.hwmon_root);
    let survey = source
        .survey()
        .with_context(|| format!("cannot scan {}", config.sensors.hwmon_root.display()))?;

    if survey.is_empty() {
        println!("No sensor files under {}", config.sensors.hwmon_root.display());
        return Ok(());
    }

    let mut chosen = false;
    for (path, verdict) in survey {
        let line = match verdict {
            SensorVerdict::Plausible(value) if !chosen => {
                chosen = true;
                format!("{:>7.1}°C  selected", value)
            }
            SensorVerdict::Plausible(value) => format!("{:>7.1}°C  plausible", value),
            SensorVerdict::OutOfRange(value) => format!(
                "{:>7.1}°C  outside ({}, {})",
                value, SENSOR_MIN_CELSIUS, SENSOR_MAX_CELSIUS
            ),
            SensorVerdict::Unreadable(reason) => format!("{:>9}  unreadable: {}", "-", reason),
        };
        println!("{}  {}", line, path.display());
    }
    Ok(())
}
