//! One control cycle: read, classify, govern, apply, persist

use crate::config::Config;
use crate::dsm::{DsmApi, Session};
use crate::errors::Result;
use crate::governor::{ApplyOutcome, ChangeGovernor};
use crate::mode::{FanMode, ModeNames, Thresholds};
use crate::state::{ControllerState, StateStore, Timestamp};
use crate::temperature::{TemperatureReading, TemperatureResolver};
use log::debug;
use std::fmt;
use std::path::PathBuf;

/// Summary of a completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub reading: TemperatureReading,
    pub previous_mode: Option<FanMode>,
    pub desired_mode: FanMode,
    pub outcome: ApplyOutcome,
}

impl RunReport {
    pub fn changed(&self) -> bool {
        self.outcome.changed()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let previous = self
            .previous_mode
            .map_or_else(|| "none".to_string(), |m| m.to_string());
        write!(
            f,
            "Temp={:.1}°C (from {}) | Previous mode: {} | Desired mode: {} | Changed: {}",
            self.reading.value,
            self.reading.source,
            previous,
            self.desired_mode,
            if self.changed() { "Yes" } else { "No" }
        )?;
        match &self.outcome {
            ApplyOutcome::Skipped(decision) => write!(f, " ({})", decision),
            ApplyOutcome::Applied(_) => Ok(()),
            ApplyOutcome::Failed(_, reason) => write!(f, " (apply failed: {})", reason),
        }
    }
}

/// Runs control cycles against a DSM API
pub struct FanController<'a> {
    api: &'a dyn DsmApi,
    store: StateStore,
    thresholds: Thresholds,
    modes: ModeNames,
    governor: ChangeGovernor,
    hwmon_root: PathBuf,
}

impl<'a> FanController<'a> {
    pub fn new(config: &Config, api: &'a dyn DsmApi) -> Self {
        Self {
            api,
            store: StateStore::new(&config.state.path, config.modes.clone()),
            thresholds: config.thresholds,
            modes: config.modes.clone(),
            governor: ChangeGovernor::from_config(&config.state),
            hwmon_root: config.sensors.hwmon_root.clone(),
        }
    }

    /// Run one cycle at the current time
    pub fn run(&self) -> Result<RunReport> {
        self.run_at(Timestamp::now())
    }

    /// Run one cycle as of `now`.
    ///
    /// The state is loaded once and saved once, whatever happens in between.
    pub fn run_at(&self, now: Timestamp) -> Result<RunReport> {
        let mut state = self.store.load();

        let result = self.cycle(&mut state, now);
        self.store.persist(&state);
        result
    }

    fn cycle(&self, state: &mut ControllerState, now: Timestamp) -> Result<RunReport> {
        let session = self.api.login()?;

        let reading =
            TemperatureResolver::standard(self.api, &session, &self.hwmon_root).resolve()?;
        state.record_reading(reading.value, &reading.source);

        let session = self.attach_token(session);

        let desired_mode = self.thresholds.classify(reading.value);
        let previous_mode = state.last_mode;
        debug!(
            "Desired mode {} for {:.1}°C, last applied {:?} at {}",
            desired_mode, reading.value, previous_mode, state.last_change_time
        );

        let outcome = self.governor.apply_with(desired_mode, state, now, |mode| {
            self.api.set_fan_mode(&session, self.modes.name(mode))
        });

        Ok(RunReport {
            reading,
            previous_mode,
            desired_mode,
            outcome,
        })
    }

    fn attach_token(&self, session: Session) -> Session {
        match self.api.fan_token(&session) {
            Ok(token) => session.with_token(token),
            Err(e) => {
                debug!("No fan token available: {}", e);
                session
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsm::{API_FAN_SPEED, API_SYSTEM, API_THERMAL};
    use crate::errors::FanControlError;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    /// Scripted DSM: each call answers from its field, recording what was asked
    struct ScriptedDsm {
        login_ok: bool,
        thermal: Option<Value>,
        system: Option<Value>,
        token: Option<String>,
        apply_ok: bool,
        applied: RefCell<Vec<(String, Option<String>)>>,
    }

    impl ScriptedDsm {
        fn unreachable_apis() -> Self {
            Self {
                login_ok: true,
                thermal: None,
                system: None,
                token: None,
                apply_ok: true,
                applied: RefCell::new(Vec::new()),
            }
        }

        fn with_thermal(temp: f64) -> Self {
            Self {
                thermal: Some(json!({ "cpu_temp": temp })),
                ..Self::unreachable_apis()
            }
        }

        fn applied_names(&self) -> Vec<String> {
            self.applied.borrow().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    impl DsmApi for ScriptedDsm {
        fn login(&self) -> Result<Session> {
            if self.login_ok {
                Ok(Session::new("sid-42"))
            } else {
                Err(FanControlError::Authentication("bad password".to_string()))
            }
        }

        fn thermal_status(&self, _session: &Session) -> Result<Value> {
            self.thermal.clone().ok_or(FanControlError::Api {
                api: API_THERMAL.to_string(),
                code: Some(102),
            })
        }

        fn system_info(&self, _session: &Session) -> Result<Value> {
            self.system.clone().ok_or(FanControlError::Api {
                api: API_SYSTEM.to_string(),
                code: Some(102),
            })
        }

        fn fan_token(&self, _session: &Session) -> Result<Option<String>> {
            Ok(self.token.clone())
        }

        fn set_fan_mode(&self, session: &Session, mode_name: &str) -> Result<()> {
            assert_eq!(session.sid, "sid-42");
            if !self.apply_ok {
                return Err(FanControlError::Api {
                    api: API_FAN_SPEED.to_string(),
                    code: Some(117),
                });
            }
            self.applied
                .borrow_mut()
                .push((mode_name.to_string(), session.token.clone()));
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let mut config = Config::default();
            config.state.path = dir.path().join("fanstate.json");
            config.sensors.hwmon_root = dir.path().join("hwmon-root");
            fs::create_dir_all(&config.sensors.hwmon_root).unwrap();
            Self { dir, config }
        }

        fn sensor(&self, hwmon: &str, millidegrees: &str) -> String {
            let dir = self.config.sensors.hwmon_root.join(hwmon);
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join("temp1_input");
            fs::write(&path, millidegrees).unwrap();
            format!("sysfs:{}", path.display())
        }

        fn store(&self) -> StateStore {
            StateStore::new(&self.config.state.path, self.config.modes.clone())
        }

        fn seed(&self, state: &ControllerState) {
            self.store().save(state).unwrap();
        }

        fn state_path(&self) -> &Path {
            &self.config.state.path
        }
    }

    const NOW: f64 = 1_700_000_000.0;

    #[test]
    fn test_fresh_state_hot_sensor_applies_full() {
        let fx = Fixture::new();
        let source = fx.sensor("hwmon0", "62000\n");
        let dsm = ScriptedDsm::unreachable_apis();
        let controller = FanController::new(&fx.config, &dsm);

        let report = controller.run_at(Timestamp::from_secs(NOW)).unwrap();

        assert_eq!(report.desired_mode, FanMode::Full);
        assert_eq!(report.previous_mode, None);
        assert!(report.changed());
        assert_eq!(dsm.applied_names(), vec!["fullfan".to_string()]);

        let saved = fx.store().load();
        assert_eq!(
            saved,
            ControllerState {
                last_mode: Some(FanMode::Full),
                last_change_time: Timestamp::from_secs(NOW),
                last_temperature: Some(62.0),
                last_temperature_source: Some(source),
            }
        );
    }

    #[test]
    fn test_recent_change_is_suppressed() {
        let fx = Fixture::new();
        let seeded = ControllerState {
            last_mode: Some(FanMode::Cool),
            last_change_time: Timestamp::from_secs(NOW - 30.0),
            last_temperature: Some(50.0),
            last_temperature_source: Some(API_THERMAL.to_string()),
        };
        fx.seed(&seeded);
        let dsm = ScriptedDsm::with_thermal(61.0);
        let controller = FanController::new(&fx.config, &dsm);

        let report = controller.run_at(Timestamp::from_secs(NOW)).unwrap();

        assert_eq!(report.desired_mode, FanMode::Full);
        assert!(!report.changed());
        assert!(dsm.applied.borrow().is_empty());

        let saved = fx.store().load();
        assert_eq!(saved.last_mode, Some(FanMode::Cool));
        assert_eq!(saved.last_change_time, Timestamp::from_secs(NOW - 30.0));
        assert_eq!(saved.last_temperature, Some(61.0));
        assert_eq!(saved.last_temperature_source.as_deref(), Some(API_THERMAL));
    }

    #[test]
    fn test_steady_state_makes_no_apply_call() {
        let fx = Fixture::new();
        fx.seed(&ControllerState {
            last_mode: Some(FanMode::Cool),
            last_change_time: Timestamp::from_secs(NOW - 200.0),
            ..ControllerState::default()
        });
        let dsm = ScriptedDsm::with_thermal(45.0);

        let report = FanController::new(&fx.config, &dsm)
            .run_at(Timestamp::from_secs(NOW))
            .unwrap();

        assert!(!report.changed());
        assert!(dsm.applied.borrow().is_empty());
        assert!(report.to_string().contains("Changed: No (steady)"));
    }

    #[test]
    fn test_stale_mode_is_reasserted_with_token() {
        let fx = Fixture::new();
        fx.seed(&ControllerState {
            last_mode: Some(FanMode::Quiet),
            last_change_time: Timestamp::from_secs(NOW - 301.0),
            ..ControllerState::default()
        });
        let dsm = ScriptedDsm {
            token: Some("tok-7".to_string()),
            ..ScriptedDsm::with_thermal(35.0)
        };

        let report = FanController::new(&fx.config, &dsm)
            .run_at(Timestamp::from_secs(NOW))
            .unwrap();

        assert!(report.changed());
        assert_eq!(
            *dsm.applied.borrow(),
            vec![("quietfan".to_string(), Some("tok-7".to_string()))]
        );
        assert_eq!(
            fx.store().load().last_change_time,
            Timestamp::from_secs(NOW)
        );
    }

    #[test]
    fn test_apply_failure_keeps_mode_and_time() {
        let fx = Fixture::new();
        let seeded = ControllerState {
            last_mode: Some(FanMode::Quiet),
            last_change_time: Timestamp::from_secs(NOW - 900.0),
            ..ControllerState::default()
        };
        fx.seed(&seeded);
        let dsm = ScriptedDsm {
            apply_ok: false,
            system: Some(json!({ "temp": 48 })),
            ..ScriptedDsm::unreachable_apis()
        };

        let report = FanController::new(&fx.config, &dsm)
            .run_at(Timestamp::from_secs(NOW))
            .unwrap();

        assert!(matches!(report.outcome, ApplyOutcome::Failed(..)));
        let saved = fx.store().load();
        assert_eq!(saved.last_mode, Some(FanMode::Quiet));
        assert_eq!(saved.last_change_time, Timestamp::from_secs(NOW - 900.0));
        assert_eq!(saved.last_temperature, Some(48.0));
        assert_eq!(saved.last_temperature_source.as_deref(), Some(API_SYSTEM));
    }

    #[test]
    fn test_login_failure_still_saves_state() {
        let fx = Fixture::new();
        fx.sensor("hwmon0", "50000");
        let dsm = ScriptedDsm {
            login_ok: false,
            ..ScriptedDsm::unreachable_apis()
        };

        let result = FanController::new(&fx.config, &dsm).run_at(Timestamp::from_secs(NOW));

        assert!(matches!(result, Err(FanControlError::Authentication(_))));
        assert!(fx.state_path().exists());
        assert_eq!(fx.store().load(), ControllerState::default());
        assert!(dsm.applied.borrow().is_empty());
    }

    #[test]
    fn test_no_temperature_source_aborts_and_preserves_state() {
        let fx = Fixture::new();
        fx.sensor("hwmon0", "3000");
        let seeded = ControllerState {
            last_mode: Some(FanMode::Cool),
            last_change_time: Timestamp::from_secs(NOW - 1000.0),
            last_temperature: Some(44.0),
            last_temperature_source: Some(API_THERMAL.to_string()),
        };
        fx.seed(&seeded);
        let dsm = ScriptedDsm::unreachable_apis();

        let result = FanController::new(&fx.config, &dsm).run_at(Timestamp::from_secs(NOW));

        assert!(matches!(result, Err(FanControlError::NoTemperatureSource)));
        assert_eq!(fx.store().load(), seeded);
        assert!(dsm.applied.borrow().is_empty());
    }

    #[test]
    fn test_corrupt_state_file_is_replaced() {
        let fx = Fixture::new();
        fs::write(fx.state_path(), "not json at all").unwrap();
        let dsm = ScriptedDsm::with_thermal(30.0);

        let report = FanController::new(&fx.config, &dsm)
            .run_at(Timestamp::from_secs(NOW))
            .unwrap();

        assert!(report.changed());
        assert_eq!(fx.store().load().last_mode, Some(FanMode::Quiet));
        assert!(fx.dir.path().join("fanstate.json").exists());
    }

    #[test]
    fn test_report_line_mentions_everything() {
        let report = RunReport {
            reading: TemperatureReading::new(62.04, "sysfs:/sys/class/hwmon/hwmon0/temp1_input"),
            previous_mode: Some(FanMode::Cool),
            desired_mode: FanMode::Full,
            outcome: ApplyOutcome::Applied(crate::governor::Decision::Change),
        };
        assert_eq!(
            report.to_string(),
            "Temp=62.0°C (from sysfs:/sys/class/hwmon/hwmon0/temp1_input) | \
             Previous mode: cool | Desired mode: full | Changed: Yes"
        );
    }
}
