//! Change-rate policy for fan mode transitions

use crate::config::StateConfig;
use crate::mode::FanMode;
use crate::state::{ControllerState, Timestamp};
use log::{debug, error, info};
use std::fmt;
use std::time::Duration;

/// What the governor makes of a desired mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Last change was too recent; nothing may be applied yet
    Throttled { elapsed: f64 },
    /// Desired mode differs from the last applied one
    Change,
    /// Same mode, but due for periodic re-assertion
    Refresh,
    /// Same mode and recently asserted
    Steady,
}

impl Decision {
    pub fn should_apply(&self) -> bool {
        matches!(self, Decision::Change | Decision::Refresh)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Throttled { elapsed } => {
                write!(f, "throttled ({:.0}s since last change)", elapsed)
            }
            Decision::Change => f.write_str("change"),
            Decision::Refresh => f.write_str("refresh"),
            Decision::Steady => f.write_str("steady"),
        }
    }
}

/// Outcome of a guarded apply
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Nothing was attempted
    Skipped(Decision),
    /// The apply call succeeded and the state was advanced
    Applied(Decision),
    /// The apply call failed; the state was left as it was
    Failed(Decision, String),
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }

    pub fn decision(&self) -> Decision {
        match self {
            ApplyOutcome::Skipped(d) | ApplyOutcome::Applied(d) | ApplyOutcome::Failed(d, _) => {
                *d
            }
        }
    }
}

/// Decides whether a mode may be applied now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeGovernor {
    min_change_interval: Duration,
    force_refresh_interval: Duration,
}

impl ChangeGovernor {
    pub fn new(min_change_interval: Duration, force_refresh_interval: Duration) -> Self {
        Self {
            min_change_interval,
            force_refresh_interval,
        }
    }

    pub fn from_config(config: &StateConfig) -> Self {
        Self::new(config.min_change_interval(), config.force_refresh_interval())
    }

    pub fn decide(&self, desired: FanMode, state: &ControllerState, now: Timestamp) -> Decision {
        let elapsed = now.seconds_since(state.last_change_time);

        if elapsed < self.min_change_interval.as_secs_f64() {
            return Decision::Throttled { elapsed };
        }
        if state.last_mode != Some(desired) {
            return Decision::Change;
        }
        if elapsed > self.force_refresh_interval.as_secs_f64() {
            return Decision::Refresh;
        }
        Decision::Steady
    }

    pub fn should_apply(&self, desired: FanMode, state: &ControllerState, now: Timestamp) -> bool {
        self.decide(desired, state, now).should_apply()
    }

    /// Apply `desired` through `apply` if the policy allows it.
    ///
    /// `state` is only advanced when `apply` succeeds.
    pub fn apply_with<F, E>(
        &self,
        desired: FanMode,
        state: &mut ControllerState,
        now: Timestamp,
        apply: F,
    ) -> ApplyOutcome
    where
        F: FnOnce(FanMode) -> Result<(), E>,
        E: fmt::Display,
    {
        let decision = self.decide(desired, state, now);
        if !decision.should_apply() {
            debug!("Not applying {} mode: {}", desired, decision);
            return ApplyOutcome::Skipped(decision);
        }

        match apply(desired) {
            Ok(()) => {
                state.record_change(desired, now);
                info!("Fan mode set to {} ({})", desired, decision);
                ApplyOutcome::Applied(decision)
            }
            Err(e) => {
                error!("Failed to set fan mode to {}: {}", desired, e);
                ApplyOutcome::Failed(decision, e.to_string())
            }
        }
    }
}

impl Default for ChangeGovernor {
    fn default() -> Self {
        Self::from_config(&StateConfig::default())
    }
}
