//! Fan modes and the temperature thresholds that select them

use serde::Deserialize;
use std::fmt;

/// Fan modes understood by DSM, ordered by intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FanMode {
    Quiet,
    Cool,
    Full,
}

impl FanMode {
    pub const ALL: [FanMode; 3] = [FanMode::Quiet, FanMode::Cool, FanMode::Full];
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FanMode::Quiet => "quiet",
            FanMode::Cool => "cool",
            FanMode::Full => "full",
        };
        f.write_str(label)
    }
}

/// Mode names as the DSM fan-speed API spells them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModeNames {
    #[serde(default = "default_quiet")]
    pub quiet: String,
    #[serde(default = "default_cool")]
    pub cool: String,
    #[serde(default = "default_full")]
    pub full: String,
}

fn default_quiet() -> String {
    "quietfan".to_string()
}

fn default_cool() -> String {
    "coolfan".to_string()
}

fn default_full() -> String {
    "fullfan".to_string()
}

impl Default for ModeNames {
    fn default() -> Self {
        Self {
            quiet: default_quiet(),
            cool: default_cool(),
            full: default_full(),
        }
    }
}

impl ModeNames {
    /// API name for `mode`
    pub fn name(&self, mode: FanMode) -> &str {
        match mode {
            FanMode::Quiet => &self.quiet,
            FanMode::Cool => &self.cool,
            FanMode::Full => &self.full,
        }
    }

    /// Reverse lookup; names not configured here are unknown
    pub fn mode(&self, name: &str) -> Option<FanMode> {
        FanMode::ALL.into_iter().find(|mode| self.name(*mode) == name)
    }
}

/// Upper bounds (exclusive) of the quiet and cool bands, in °C
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_quiet_max")]
    pub quiet_max: f64,
    #[serde(default = "default_cool_max")]
    pub cool_max: f64,
}

fn default_quiet_max() -> f64 {
    40.0
}

fn default_cool_max() -> f64 {
    55.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            quiet_max: default_quiet_max(),
            cool_max: default_cool_max(),
        }
    }
}

impl Thresholds {
    /// Map a temperature onto a fan mode.
    ///
    /// A reading equal to a boundary belongs to the higher band. Anything that
    /// fails both comparisons (NaN included) lands on `Full`.
    pub fn classify(&self, temp: f64) -> FanMode {
        if temp < self.quiet_max {
            FanMode::Quiet
        } else if temp < self.cool_max {
            FanMode::Cool
        } else {
            FanMode::Full
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bands() {
        let t = Thresholds::default();
        assert_eq!(t.classify(-5.0), FanMode::Quiet);
        assert_eq!(t.classify(25.0), FanMode::Quiet);
        assert_eq!(t.classify(39.99), FanMode::Quiet);
        assert_eq!(t.classify(40.0), FanMode::Cool);
        assert_eq!(t.classify(47.5), FanMode::Cool);
        assert_eq!(t.classify(54.999), FanMode::Cool);
        assert_eq!(t.classify(55.0), FanMode::Full);
        assert_eq!(t.classify(90.0), FanMode::Full);
    }

    #[test]
    fn test_classify_sweep_is_monotonic() {
        let t = Thresholds::default();
        let mut previous = FanMode::Quiet;
        for tenth in -100..=1200 {
            let mode = t.classify(tenth as f64 / 10.0);
            assert!(mode >= previous, "mode dropped at {}", tenth as f64 / 10.0);
            previous = mode;
        }
        assert_eq!(previous, FanMode::Full);
    }

    #[test]
    fn test_classify_custom_and_degenerate_thresholds() {
        let t = Thresholds {
            quiet_max: 50.0,
            cool_max: 50.0,
        };
        assert_eq!(t.classify(49.9), FanMode::Quiet);
        assert_eq!(t.classify(50.0), FanMode::Full);
        assert_eq!(t.classify(f64::NAN), FanMode::Full);
    }

    #[test]
    fn test_mode_names_lookup() {
        let names = ModeNames::default();
        assert_eq!(names.name(FanMode::Cool), "coolfan");
        assert_eq!(names.mode("fullfan"), Some(FanMode::Full));
        assert_eq!(names.mode("turbo"), None);
    }

    #[test]
    fn test_modes_ordered_by_intensity() {
        assert!(FanMode::Quiet < FanMode::Cool);
        assert!(FanMode::Cool < FanMode::Full);
    }
}
