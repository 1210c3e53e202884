//! Configuration for the fan controller
//!
//! Everything the controller needs is collected here once at start-up and then
//! handed to each component by reference. The file format is TOML:
//!
//! ```toml
//! [dsm]
//! host = "https://nas.example.synology.me:5001"
//! username = "fanbot"
//!
//! [thresholds]
//! quiet_max = 40.0
//! cool_max = 55.0
//!
//! [state]
//! path = "/volume1/scripts/.fanstate.json"
//! ```

use crate::errors::{FanControlError, Result};
use crate::mode::{FanMode, ModeNames, Thresholds};
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const ENV_CONFIG: &str = "SYNO_FAN_CONFIG";
/// Environment variable overriding `dsm.username`
pub const ENV_USER: &str = "SYNO_FAN_USER";
/// Environment variable overriding `dsm.password`
pub const ENV_PASSWORD: &str = "SYNO_FAN_PASSWORD";
/// Config file used when nothing else is specified
pub const DEFAULT_CONFIG_PATH: &str = "/etc/syno-fan-control.toml";

/// Fan controller configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dsm: DsmConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub modes: ModeNames,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub sensors: SensorConfig,
}

/// Connection settings for the DSM web API
#[derive(Debug, Clone, Deserialize)]
pub struct DsmConfig {
    /// Base URL, e.g. `https://nas.example.synology.me:5001`
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Verify the TLS certificate of `host`
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Session name passed to the login call
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// State persistence and change-rate settings
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Location of the JSON state file
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
    /// Re-apply the current mode after this many seconds even if unchanged
    #[serde(default = "default_force_refresh")]
    pub force_refresh_interval_secs: u64,
    /// Minimum number of seconds between two applied changes
    #[serde(default = "default_min_change")]
    pub min_change_interval_secs: u64,
}

/// Local sensor fallback settings
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_hwmon_root")]
    pub hwmon_root: PathBuf,
}

fn default_host() -> String {
    "https://localhost:5001".to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_name() -> String {
    "fancontrol".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/volume1/scripts/.fanstate.json")
}

fn default_force_refresh() -> u64 {
    300
}

fn default_min_change() -> u64 {
    60
}

fn default_hwmon_root() -> PathBuf {
    PathBuf::from("/sys/class/hwmon")
}

impl Default for DsmConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            username: String::new(),
            password: String::new(),
            verify_ssl: default_true(),
            session_name: default_session_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DsmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            force_refresh_interval_secs: default_force_refresh(),
            min_change_interval_secs: default_min_change(),
        }
    }
}

impl StateConfig {
    pub fn force_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.force_refresh_interval_secs)
    }

    pub fn min_change_interval(&self) -> Duration {
        Duration::from_secs(self.min_change_interval_secs)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            hwmon_root: default_hwmon_root(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            FanControlError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Resolve and load the configuration.
    ///
    /// An explicit path must exist. Otherwise `SYNO_FAN_CONFIG` is consulted,
    /// then [`DEFAULT_CONFIG_PATH`], and finally the built-in defaults are used.
    /// Credentials from the environment win over the file in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(
            explicit,
            |key| std::env::var(key).ok(),
            Path::new(DEFAULT_CONFIG_PATH),
        )
    }

    fn load_with<F>(explicit: Option<&Path>, lookup: F, default_path: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match Self::locate(explicit, &lookup, default_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    fn locate<F>(explicit: Option<&Path>, lookup: &F, default_path: &Path) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = lookup(ENV_CONFIG) {
            return Some(PathBuf::from(path));
        }
        if default_path.exists() {
            Some(default_path.to_path_buf())
        } else {
            None
        }
    }

    /// Overlay credentials supplied through the environment
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(ENV_USER) {
            debug!("Using DSM username from {}", ENV_USER);
            self.dsm.username = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            debug!("Using DSM password from {}", ENV_PASSWORD);
            self.dsm.password = password;
        }
    }

    /// Check the configuration for values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        let host = self.dsm.host.trim();
        if host.is_empty() {
            return Err(FanControlError::Config("dsm.host must not be empty".to_string()));
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(FanControlError::Config(format!(
                "dsm.host must start with http:// or https://, got {}",
                host
            )));
        }
        if self.dsm.timeout_secs == 0 {
            return Err(FanControlError::Config(
                "dsm.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let Thresholds { quiet_max, cool_max } = self.thresholds;
        if !quiet_max.is_finite() || !cool_max.is_finite() {
            return Err(FanControlError::Config(
                "thresholds must be finite numbers".to_string(),
            ));
        }
        if quiet_max > cool_max {
            return Err(FanControlError::Config(format!(
                "thresholds.quiet_max ({}) must not exceed thresholds.cool_max ({})",
                quiet_max, cool_max
            )));
        }

        for mode in FanMode::ALL {
            let name = self.modes.name(mode);
            if name.trim().is_empty() {
                return Err(FanControlError::Config(format!(
                    "mode name for {:?} must not be empty",
                    mode
                )));
            }
        }
        let names = [&self.modes.quiet, &self.modes.cool, &self.modes.full];
        if names[0] == names[1] || names[1] == names[2] || names[0] == names[2] {
            return Err(FanControlError::Config(
                "mode names must be distinct".to_string(),
            ));
        }

        Ok(())
    }
}
