//! Thermal Regulation Control Loop (Hardened)
//!
//! Periodic regulation: read the sensor aggregate, run the PID, derive a
//! relay decision, apply it, publish the outcome.
//!
//! # Safety Features
//! - **Fail-safe default**: any tick failure forces all relays off
//! - **Graceful degradation**: a failed tick never crashes the loop or
//!   corrupts PID state beyond the intentional skipped integral update
//! - **No-data handling**: an empty aggregation window forces all-off and
//!   skips the regulator, preserving integral history for when data returns
//! - **Error counting**: consecutive failures tracked, log level escalates
//! - **Shutdown contract**: a final best-effort all-off is always issued

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use chrono::Datelike;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use tc_core::constants::{limits, timing};
use tc_core::data::persistence::{StateStore, keys, set_best_effort};
use tc_core::engine::relay::{self, PolicyFlags, RelayPolicy};
use tc_core::engine::pid::PidRegulator;
use tc_core::hw::actuator::{RelayActuator, apply_outputs};
use tc_core::sensors::SensorStore;
use tc_core::state::ControlState;
use tc_core::{RelayDecision, Result, Thermostat};

/// Periodic control task over the shared core handles
pub struct ControlLoop {
    state: Arc<ControlState>,
    sensors: Arc<Mutex<SensorStore>>,
    actuator: Arc<Mutex<Box<dyn RelayActuator>>>,
    pid: Arc<Mutex<PidRegulator>>,
    store: Arc<dyn StateStore>,
    policy: RelayPolicy,
    period: Duration,
}

impl ControlLoop {
    /// Build a loop over the same handles the service surface shares.
    pub fn new(thermostat: &Thermostat) -> Self {
        Self {
            state: thermostat.state(),
            sensors: thermostat.sensors(),
            actuator: thermostat.actuator(),
            pid: thermostat.pid(),
            store: thermostat.store(),
            policy: RelayPolicy::default(),
            period: thermostat.tick_period(),
        }
    }

    pub fn with_policy(mut self, policy: RelayPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// One control tick.
    ///
    /// `now` drives the aggregation window, `pid_now` the regulator's
    /// elapsed-time terms, `month` the seasonal lockout (1-12). Parameters
    /// rather than ambient clocks so every path is testable.
    ///
    /// Snapshot discipline: each field group is read under its own short
    /// lock before any computation; a write landing after the snapshot is
    /// honored on the next tick, which is the documented guarantee.
    pub fn tick(&self, now: SystemTime, pid_now: Instant, month: u32) -> Result<RelayDecision> {
        let reg = self.state.regulation();
        let mode = self.state.mode();
        let subs = self.state.subsystems();
        let flags = PolicyFlags {
            manual_override: self.state.manual_override(),
            heating_enabled: subs.heating,
            cooling_enabled: subs.cooling,
        };

        let aggregate = self
            .sensors
            .lock()
            .windowed_average(&mode, timing::AGGREGATION_WINDOW, now);

        // No data: skip the regulator entirely so the integral freezes
        // instead of decaying or winding up on a stale error.
        let signal = aggregate.map(|agg| {
            self.pid
                .lock()
                .update(reg.gains, reg.setpoint_f, agg.temperature_f, pid_now)
        });

        let decision = relay::decide(&self.policy, signal, month, flags);

        {
            let mut actuator = self.actuator.lock();
            apply_outputs(actuator.as_mut(), decision.outputs())?;
        }

        self.state.publish_tick(decision, aggregate, signal);

        // Best-effort status mirror for external observers; a dead store
        // must not fail the tick.
        set_best_effort(&*self.store, keys::LAST_DECISION, &decision.to_string());
        if let Some(agg) = aggregate {
            set_best_effort(
                &*self.store,
                keys::AGGREGATE_TEMPERATURE,
                &agg.temperature_f.to_string(),
            );
        }
        if let Some(signal) = signal {
            set_best_effort(&*self.store, keys::PID_VALUE, &signal.to_string());
        }

        debug!(
            ?decision,
            aggregate_f = aggregate.map(|a| a.temperature_f),
            pid_value = signal,
            "Tick complete"
        );
        Ok(decision)
    }

    /// Force every relay off, swallowing (but logging) failures. The
    /// fallback when a tick fails and the mandatory shutdown action.
    pub fn force_all_off(&self) {
        let mut actuator = self.actuator.lock();
        if let Err(e) = actuator.all_off() {
            error!(error = %e, "CRITICAL: failed to force relays off");
        }
    }

    /// Run until `shutdown` is set. `wakeup` shortcuts the sleep so a
    /// shutdown (or future reload) is honored immediately.
    pub async fn run(self, shutdown: Arc<AtomicBool>, wakeup: Arc<Notify>) {
        info!(period = ?self.period, "Control loop starting");

        // Relays are forced off before the first decision so a crash-restart
        // never inherits an energized branch.
        self.force_all_off();

        let mut consecutive_errors: u32 = 0;

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Control loop shutting down");
                break;
            }

            let month = chrono::Local::now().month();
            let result = self.tick(SystemTime::now(), Instant::now(), month);

            match result {
                Ok(_) => {
                    if consecutive_errors > 0 {
                        debug!(
                            recovered_after = consecutive_errors,
                            "Control loop recovered"
                        );
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors == 1
                        || consecutive_errors % limits::MAX_CONSECUTIVE_ERRORS == 0
                    {
                        error!(count = consecutive_errors, error = %e, "Control tick failed");
                    } else {
                        warn!(error = %e, "Control tick failed");
                    }
                    // Contain the failure to this tick: safe state now,
                    // retry on the next period.
                    self.force_all_off();
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = wakeup.notified() => {
                    debug!("Control loop woken early");
                }
            }
        }

        // Mandatory cleanup contract: never exit with a relay energized.
        self.force_all_off();
        info!("Control loop stopped, relays off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU8;
    use tc_core::data::persistence::JsonFileStore;
    use tc_core::{AggregationMode, ControlError};

    /// Records the last written relay states; fails on demand.
    #[derive(Default)]
    struct RecordingRelays {
        heating: AtomicBool,
        cooling: AtomicBool,
        fan: AtomicBool,
        fail_writes: AtomicBool,
        all_off_calls: AtomicU8,
    }

    struct RecordingHandle(Arc<RecordingRelays>);

    impl RelayActuator for RecordingHandle {
        fn set_heating(&mut self, on: bool) -> Result<()> {
            self.check()?;
            self.0.heating.store(on, Ordering::SeqCst);
            Ok(())
        }
        fn set_cooling(&mut self, on: bool) -> Result<()> {
            self.check()?;
            self.0.cooling.store(on, Ordering::SeqCst);
            Ok(())
        }
        fn set_fan(&mut self, on: bool) -> Result<()> {
            self.check()?;
            self.0.fan.store(on, Ordering::SeqCst);
            Ok(())
        }
        fn all_off(&mut self) -> Result<()> {
            self.0.all_off_calls.fetch_add(1, Ordering::SeqCst);
            self.0.heating.store(false, Ordering::SeqCst);
            self.0.cooling.store(false, Ordering::SeqCst);
            self.0.fan.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    impl RecordingHandle {
        fn check(&self) -> Result<()> {
            if self.0.fail_writes.load(Ordering::SeqCst) {
                return Err(ControlError::ActuatorWrite {
                    relay: "heating",
                    reason: "injected".into(),
                });
            }
            Ok(())
        }
    }

    fn harness() -> (Thermostat, ControlLoop, Arc<RecordingRelays>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path().join("state.json")).unwrap());
        let relays = Arc::new(RecordingRelays::default());
        let thermostat = Thermostat::new(
            Arc::new(ControlState::new()),
            Arc::new(Mutex::new(SensorStore::new())),
            Arc::new(Mutex::new(
                Box::new(RecordingHandle(Arc::clone(&relays))) as Box<dyn RelayActuator>
            )),
            store,
        );
        let control = ControlLoop::new(&thermostat);
        (thermostat, control, relays, dir)
    }

    #[test]
    fn empty_window_yields_no_data_and_all_off() {
        let (_t, control, relays, _dir) = harness();
        let d = control
            .tick(SystemTime::now(), Instant::now(), 4)
            .unwrap();
        assert_eq!(d, RelayDecision::NoData);
        assert!(!relays.heating.load(Ordering::SeqCst));
        assert!(!relays.cooling.load(Ordering::SeqCst));
        assert!(!relays.fan.load(Ordering::SeqCst));
    }

    #[test]
    fn cold_room_heats_in_spring() {
        let (t, control, relays, _dir) = harness();
        t.submit_reading("internal_sensor", 60.0, 40.0, None).unwrap();

        let d = control
            .tick(SystemTime::now(), Instant::now(), 4)
            .unwrap();
        assert_eq!(d, RelayDecision::Heating);
        assert!(relays.heating.load(Ordering::SeqCst));
        assert!(relays.fan.load(Ordering::SeqCst));
        assert!(!relays.cooling.load(Ordering::SeqCst));

        // Outcome published for status readers
        let status = t.get_status();
        assert_eq!(status.decision, RelayDecision::Heating);
        assert_eq!(status.aggregate.unwrap().temperature_f, 60.0);
        assert!(status.pid_value.unwrap() < 0.0);
    }

    #[test]
    fn heat_call_in_july_is_locked_out() {
        let (t, control, relays, _dir) = harness();
        t.submit_reading("internal_sensor", 60.0, 40.0, None).unwrap();

        let d = control
            .tick(SystemTime::now(), Instant::now(), 7)
            .unwrap();
        assert_eq!(d, RelayDecision::SeasonalLockoutHeating);
        assert!(!relays.heating.load(Ordering::SeqCst));
    }

    #[test]
    fn custom_policy_governs_the_tick() {
        let (t, control, _relays, _dir) = harness();
        t.submit_reading("internal_sensor", 60.0, 40.0, None).unwrap();

        // An operator policy that locks heat out in April
        let control = control.with_policy(RelayPolicy {
            summer_months: [4].into_iter().collect(),
            ..RelayPolicy::default()
        });
        let d = control.tick(SystemTime::now(), Instant::now(), 4).unwrap();
        assert_eq!(d, RelayDecision::SeasonalLockoutHeating);
    }

    #[test]
    fn override_set_mid_run_wins_on_the_next_tick() {
        let (t, control, relays, _dir) = harness();
        t.submit_reading("internal_sensor", 60.0, 40.0, None).unwrap();

        let d = control.tick(SystemTime::now(), Instant::now(), 4).unwrap();
        assert_eq!(d, RelayDecision::Heating);

        t.set_override(true).unwrap();
        let d = control.tick(SystemTime::now(), Instant::now(), 4).unwrap();
        assert_eq!(d, RelayDecision::SystemOff);
        assert!(!relays.heating.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_tick_forces_all_off_and_spares_pid_state() {
        let (t, control, relays, _dir) = harness();
        t.submit_reading("internal_sensor", 60.0, 40.0, None).unwrap();

        let t0 = Instant::now();
        control.tick(SystemTime::now(), t0, 4).unwrap();
        control
            .tick(SystemTime::now(), t0 + Duration::from_secs(5), 4)
            .unwrap();
        let integral_before = t.pid().lock().integral();
        assert!(integral_before != 0.0);

        relays.fail_writes.store(true, Ordering::SeqCst);
        let err = control
            .tick(SystemTime::now(), t0 + Duration::from_secs(10), 4)
            .unwrap_err();
        assert!(matches!(err, ControlError::ActuatorWrite { .. }));
        control.force_all_off();
        assert!(relays.all_off_calls.load(Ordering::SeqCst) >= 1);

        // The failed tick still ran the regulator once; the failure itself
        // must not have reset accumulated history.
        relays.fail_writes.store(false, Ordering::SeqCst);
        assert!(t.pid().lock().integral().abs() >= integral_before.abs());
    }

    #[test]
    fn specific_mode_follows_only_its_sensor() {
        let (t, control, _relays, _dir) = harness();
        t.submit_reading("hot_room", 80.0, 40.0, None).unwrap();
        t.submit_reading("cold_room", 60.0, 40.0, None).unwrap();
        t.set_mode(AggregationMode::Specific("hot_room".into()))
            .unwrap();

        let d = control
            .tick(SystemTime::now(), Instant::now(), 4)
            .unwrap();
        assert_eq!(d, RelayDecision::Cooling);
    }

    #[test]
    fn no_data_tick_freezes_the_integral() {
        let (t, control, _relays, _dir) = harness();
        let now = SystemTime::now();
        t.submit_reading("internal_sensor", 60.0, 40.0, Some(now)).unwrap();

        let t0 = Instant::now();
        control.tick(now, t0, 4).unwrap();
        control.tick(now, t0 + Duration::from_secs(5), 4).unwrap();
        let frozen = t.pid().lock().integral();

        // Two minutes later the reading has aged out of the window
        let later = now + Duration::from_secs(120);
        let d = control.tick(later, t0 + Duration::from_secs(120), 4).unwrap();
        assert_eq!(d, RelayDecision::NoData);
        assert_eq!(t.pid().lock().integral(), frozen);
    }
}
