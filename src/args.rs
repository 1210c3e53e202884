//! Command line argument parsing for the fan controller

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Synology Fan Control
///
/// Reads the device temperature, picks a fan mode and applies it through the
/// DSM web API. Meant to be run periodically from a scheduler.
#[derive(Parser)]
#[command(name = "syno-fan-control")]
#[command(about = "Temperature-driven fan mode control for Synology DSM")]
#[command(version)]
pub struct Args {
    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also append log output to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run one control cycle (the default)
    Run,
    /// Show the persisted controller state
    State,
    /// Show which mode a temperature maps to
    Classify {
        /// Temperature in Celsius
        #[arg(allow_negative_numbers = true)]
        temp: f64,
    },
    /// List local sensor files in fallback scan order
    Sensors,
}

impl Args {
    /// Subcommand to execute, `run` when none was given
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Run)
    }
}
