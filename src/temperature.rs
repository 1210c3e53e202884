//! Temperature sources and the fallback resolver
//!
//! Sources are tried in priority order and the first one that produces a
//! reading wins. A source that fails for any reason simply reports
//! [`SourceOutcome::Unavailable`]; only running out of sources is an error.

use crate::dsm::{temperature_field, DsmApi, Session, API_SYSTEM, API_THERMAL};
use crate::errors::{FanControlError, Result};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Exclusive plausibility bounds for raw sensor readings, in °C
pub const SENSOR_MIN_CELSIUS: f64 = 10.0;
pub const SENSOR_MAX_CELSIUS: f64 = 110.0;

/// A temperature and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub value: f64,
    pub source: String,
}

impl TemperatureReading {
    pub fn new(value: f64, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
        }
    }
}

impl fmt::Display for TemperatureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C (from {})", self.value, self.source)
    }
}

/// Result of probing a single source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Reading(TemperatureReading),
    Unavailable(String),
}

/// One stage of the resolver
pub trait TemperatureSource {
    /// Short label for log lines
    fn name(&self) -> &str;

    fn probe(&self) -> SourceOutcome;
}

/// `SYNO.Core.Hardware.Thermal`: `cpu_temp`, else `system_temp`
pub struct ThermalApiSource<'a> {
    api: &'a dyn DsmApi,
    session: &'a Session,
}

impl<'a> ThermalApiSource<'a> {
    pub fn new(api: &'a dyn DsmApi, session: &'a Session) -> Self {
        Self { api, session }
    }
}

impl TemperatureSource for ThermalApiSource<'_> {
    fn name(&self) -> &str {
        API_THERMAL
    }

    fn probe(&self) -> SourceOutcome {
        let data = match self.api.thermal_status(self.session) {
            Ok(data) => data,
            Err(e) => return SourceOutcome::Unavailable(e.to_string()),
        };

        // a zero cpu_temp means the field is not populated on this model
        let value = temperature_field(&data, "cpu_temp")
            .filter(|t| *t != 0.0)
            .or_else(|| temperature_field(&data, "system_temp"));

        match value {
            Some(value) => SourceOutcome::Reading(TemperatureReading::new(value, API_THERMAL)),
            None => SourceOutcome::Unavailable(
                FanControlError::MissingField {
                    api: API_THERMAL.to_string(),
                    field: "cpu_temp/system_temp".to_string(),
                }
                .to_string(),
            ),
        }
    }
}

/// `SYNO.Core.System` info: `temp`
pub struct SystemInfoSource<'a> {
    api: &'a dyn DsmApi,
    session: &'a Session,
}

impl<'a> SystemInfoSource<'a> {
    pub fn new(api: &'a dyn DsmApi, session: &'a Session) -> Self {
        Self { api, session }
    }
}

impl TemperatureSource for SystemInfoSource<'_> {
    fn name(&self) -> &str {
        API_SYSTEM
    }

    fn probe(&self) -> SourceOutcome {
        match self.api.system_info(self.session) {
            Ok(data) => match temperature_field(&data, "temp") {
                Some(value) => SourceOutcome::Reading(TemperatureReading::new(value, API_SYSTEM)),
                None => SourceOutcome::Unavailable(
                    FanControlError::MissingField {
                        api: API_SYSTEM.to_string(),
                        field: "temp".to_string(),
                    }
                    .to_string(),
                ),
            },
            Err(e) => SourceOutcome::Unavailable(e.to_string()),
        }
    }
}

/// Verdict on one sensor file
#[derive(Debug, Clone, PartialEq)]
pub enum SensorVerdict {
    Plausible(f64),
    OutOfRange(f64),
    Unreadable(String),
}

/// Direct scan of `hwmon*/temp*_input` files under a hwmon root
pub struct SysfsSource {
    hwmon_root: PathBuf,
}

impl SysfsSource {
    pub fn new(hwmon_root: impl Into<PathBuf>) -> Self {
        Self {
            hwmon_root: hwmon_root.into(),
        }
    }

    /// Candidate sensor files in scan order (lexical by path)
    pub fn candidates(&self) -> Result<Vec<PathBuf>> {
        let mut candidates = Vec::new();

        for entry in fs::read_dir(&self.hwmon_root)? {
            let entry = entry?;
            let hwmon_path = entry.path();

            let is_hwmon = hwmon_path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("hwmon"));
            if !is_hwmon || !hwmon_path.is_dir() {
                continue;
            }

            let sensors = match fs::read_dir(&hwmon_path) {
                Ok(sensors) => sensors,
                Err(e) => {
                    debug!("Skipping {}: {}", hwmon_path.display(), e);
                    continue;
                }
            };
            for sensor in sensors.flatten() {
                let path = sensor.path();
                if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                    if file_name.starts_with("temp") && file_name.ends_with("_input") {
                        candidates.push(path);
                    }
                }
            }
        }

        candidates.sort();
        Ok(candidates)
    }

    /// Read one sensor file and judge its value
    pub fn inspect(path: &Path) -> SensorVerdict {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return SensorVerdict::Unreadable(e.to_string()),
        };
        let millidegrees: i64 = match content.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                return SensorVerdict::Unreadable(format!(
                    "not an integer: {:?}",
                    content.trim()
                ))
            }
        };

        // Temperature is in millidegrees Celsius
        let celsius = millidegrees as f64 / 1000.0;
        if is_plausible(celsius) {
            SensorVerdict::Plausible(celsius)
        } else {
            SensorVerdict::OutOfRange(celsius)
        }
    }

    /// Every candidate with its verdict, in scan order
    pub fn survey(&self) -> Result<Vec<(PathBuf, SensorVerdict)>> {
        Ok(self
            .candidates()?
            .into_iter()
            .map(|path| {
                let verdict = Self::inspect(&path);
                (path, verdict)
            })
            .collect())
    }
}

impl TemperatureSource for SysfsSource {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn probe(&self) -> SourceOutcome {
        let candidates = match self.candidates() {
            Ok(candidates) => candidates,
            Err(e) => {
                return SourceOutcome::Unavailable(format!(
                    "cannot scan {}: {}",
                    self.hwmon_root.display(),
                    e
                ))
            }
        };

        for path in &candidates {
            match Self::inspect(path) {
                SensorVerdict::Plausible(value) => {
                    return SourceOutcome::Reading(TemperatureReading::new(
                        value,
                        format!("sysfs:{}", path.display()),
                    ));
                }
                SensorVerdict::OutOfRange(value) => {
                    debug!("Rejecting {}: {:.1}°C out of range", path.display(), value);
                }
                SensorVerdict::Unreadable(reason) => {
                    debug!("Rejecting {}: {}", path.display(), reason);
                }
            }
        }

        SourceOutcome::Unavailable(format!(
            "no plausible sensor among {} candidates under {}",
            candidates.len(),
            self.hwmon_root.display()
        ))
    }
}

fn is_plausible(celsius: f64) -> bool {
    celsius > SENSOR_MIN_CELSIUS && celsius < SENSOR_MAX_CELSIUS
}

/// Ordered fallback over a list of sources
pub struct TemperatureResolver<'a> {
    sources: Vec<Box<dyn TemperatureSource + 'a>>,
}

impl<'a> TemperatureResolver<'a> {
    pub fn new(sources: Vec<Box<dyn TemperatureSource + 'a>>) -> Self {
        Self { sources }
    }

    /// The standard chain: thermal API, system info API, then sysfs
    pub fn standard(api: &'a dyn DsmApi, session: &'a Session, hwmon_root: &Path) -> Self {
        let sources: Vec<Box<dyn TemperatureSource + 'a>> = vec![
            Box::new(ThermalApiSource::new(api, session)),
            Box::new(SystemInfoSource::new(api, session)),
            Box::new(SysfsSource::new(hwmon_root)),
        ];
        Self::new(sources)
    }

    /// First reading in priority order
    pub fn resolve(&self) -> Result<TemperatureReading> {
        for source in &self.sources {
            match source.probe() {
                SourceOutcome::Reading(reading) => {
                    info!("Temperature {}", reading);
                    return Ok(reading);
                }
                SourceOutcome::Unavailable(reason) => {
                    debug!("Source {} unavailable: {}", source.name(), reason);
                }
            }
        }

        warn!("All {} temperature sources exhausted", self.sources.len());
        Err(FanControlError::NoTemperatureSource)
    }
}
