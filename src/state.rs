//! Controller state carried from one invocation to the next

use crate::errors::Result;
use crate::mode::{FanMode, ModeNames};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Wall-clock time as fractional unix seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0.0);

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis() as f64 / 1000.0)
    }

    /// Seconds from `earlier` to `self`; negative if the clock went backwards
    pub fn seconds_since(&self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Timestamp::EPOCH {
            return f.write_str("never");
        }
        match chrono::DateTime::from_timestamp_millis((self.0 * 1000.0) as i64) {
            Some(dt) => write!(
                f,
                "{}",
                dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            ),
            None => write!(f, "{:.0}", self.0),
        }
    }
}

/// In-memory controller state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    /// Mode most recently applied successfully; `None` on first run
    pub last_mode: Option<FanMode>,
    /// When `last_mode` was applied; epoch if never
    pub last_change_time: Timestamp,
    pub last_temperature: Option<f64>,
    pub last_temperature_source: Option<String>,
}

impl ControllerState {
    /// Record a successful apply. `last_change_time` never moves backwards.
    pub fn record_change(&mut self, mode: FanMode, now: Timestamp) {
        self.last_mode = Some(mode);
        if now > self.last_change_time {
            self.last_change_time = now;
        }
    }

    /// Record the latest observed temperature (diagnostic only)
    pub fn record_reading(&mut self, value: f64, source: &str) {
        self.last_temperature = Some(value);
        self.last_temperature_source = Some(source.to_string());
    }
}

/// On-disk layout of the state file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    last_mode: Option<String>,
    #[serde(default)]
    last_change: Option<Timestamp>,
    #[serde(default)]
    last_temp: Option<f64>,
    #[serde(default)]
    temp_source: Option<String>,
}

/// Loads and atomically saves [`ControllerState`] as JSON
pub struct StateStore {
    path: PathBuf,
    names: ModeNames,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>, names: ModeNames) -> Self {
        Self {
            path: path.into(),
            names,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path the state is written to before being renamed into place
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Load the persisted state, falling back to defaults on any problem
    pub fn load(&self) -> ControllerState {
        match self.try_load() {
            Ok(Some(state)) => {
                debug!("Loaded state from {}: {:?}", self.path.display(), state);
                state
            }
            Ok(None) => {
                warn!(
                    "No state file at {}, starting fresh",
                    self.path.display()
                );
                ControllerState::default()
            }
            Err(e) => {
                warn!(
                    "Could not load state from {}: {}; starting fresh",
                    self.path.display(),
                    e
                );
                ControllerState::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<ControllerState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let file: StateFile = serde_json::from_str(&json)?;

        let last_mode = match file.last_mode.as_deref() {
            Some(name) => {
                let mode = self.names.mode(name);
                if mode.is_none() {
                    warn!(
                        "Stored mode '{}' is not a configured mode name, treating as unknown",
                        name
                    );
                }
                mode
            }
            None => None,
        };

        Ok(Some(ControllerState {
            last_mode,
            last_change_time: file.last_change.unwrap_or_default(),
            last_temperature: file.last_temp,
            last_temperature_source: file.temp_source,
        }))
    }

    /// Write the state to a temporary sibling, then rename it over the real file
    pub fn save(&self, state: &ControllerState) -> Result<()> {
        let file = StateFile {
            last_mode: state
                .last_mode
                .map(|mode| self.names.name(mode).to_string()),
            last_change: Some(state.last_change_time),
            last_temp: state.last_temperature,
            temp_source: state.last_temperature_source.clone(),
        };
        let json = serde_json::to_string(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        let written = write_synced(&temp_path, json.as_bytes())
            .and_then(|()| fs::rename(&temp_path, &self.path));

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!("State saved to {}", self.path.display());
        Ok(())
    }

    /// Save, logging instead of failing
    pub fn persist(&self, state: &ControllerState) -> bool {
        match self.save(state) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not save state to {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
