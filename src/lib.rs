//! Synology Fan Control
//!
//! A run-once fan-mode controller for Synology DSM devices. Each invocation reads
//! the device temperature, maps it to a fan mode and sets that mode through the
//! DSM web API, while rate-limiting changes using state kept between runs.

pub mod args;
pub mod config;
pub mod controller;
pub mod dsm;
pub mod errors;
pub mod governor;
pub mod logging;
pub mod mode;
pub mod state;
pub mod temperature;

// Re-export commonly used types
pub use config::Config;
pub use controller::{FanController, RunReport};
pub use errors::{FanControlError, Result};
pub use mode::{FanMode, Thresholds};
pub use state::{ControllerState, StateStore, Timestamp};
