//! Request-handler service surface
//!
//! The operations the (out-of-scope) transport layer calls into: reading
//! submission, status snapshots, and parameter updates. Every update is
//! all-or-nothing - input is validated before any lock is taken, so a
//! rejected request leaves state untouched. Successful changes are persisted
//! best-effort; a dead state store never fails a request.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::constants::timing;
use crate::data::persistence::{StateStore, keys, set_best_effort};
use crate::data::types::{AggregationMode, ManualCommand, PidGains, RelayDecision, StatusReport};
use crate::data::validation;
use crate::engine::pid::PidRegulator;
use crate::error::{ControlError, Result};
use crate::hw::actuator::{RelayActuator, apply_outputs};
use crate::sensors::SensorStore;
use crate::state::ControlState;

/// Shared handle over the control core, cloned into the control loop and
/// every request handler.
#[derive(Clone)]
pub struct Thermostat {
    state: Arc<ControlState>,
    sensors: Arc<Mutex<SensorStore>>,
    /// Single serialization point for relay writes. Manual-control handlers
    /// and the control loop contend on this same lock, so a manual command
    /// issued mid-tick cannot interleave with an automatic application.
    actuator: Arc<Mutex<Box<dyn RelayActuator>>>,
    /// The regulator is shared so a wholesale re-target could reset it; the
    /// loop owns the update cadence.
    pid: Arc<Mutex<PidRegulator>>,
    store: Arc<dyn StateStore>,
    tick_period: Duration,
}

impl Thermostat {
    pub fn new(
        state: Arc<ControlState>,
        sensors: Arc<Mutex<SensorStore>>,
        actuator: Arc<Mutex<Box<dyn RelayActuator>>>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            state,
            sensors,
            actuator,
            pid: Arc::new(Mutex::new(PidRegulator::new())),
            store,
            tick_period: timing::TICK_PERIOD,
        }
    }

    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    // Handles the control loop shares
    pub fn state(&self) -> Arc<ControlState> {
        Arc::clone(&self.state)
    }

    pub fn sensors(&self) -> Arc<Mutex<SensorStore>> {
        Arc::clone(&self.sensors)
    }

    pub fn actuator(&self) -> Arc<Mutex<Box<dyn RelayActuator>>> {
        Arc::clone(&self.actuator)
    }

    pub fn pid(&self) -> Arc<Mutex<PidRegulator>> {
        Arc::clone(&self.pid)
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    // ------------------------------------------------------------------
    // Exposed operations
    // ------------------------------------------------------------------

    /// Record a reading from a remote (or the onboard) sensor.
    /// Timestamp defaults to receipt time.
    pub fn submit_reading(
        &self,
        sensor_id: &str,
        temperature_f: f64,
        humidity: f64,
        timestamp: Option<SystemTime>,
    ) -> Result<()> {
        validation::validate_sensor_name(sensor_id)?;
        validation::validate_reading_temperature(temperature_f)?;
        validation::validate_humidity(humidity)?;

        let ts = timestamp.unwrap_or_else(SystemTime::now);
        self.sensors
            .lock()
            .ingest(sensor_id, temperature_f, humidity, ts);
        debug!(sensor_id, temperature_f, humidity, "Reading ingested");
        Ok(())
    }

    /// Status snapshot. Always well-formed: mid-failure it carries the
    /// last-known-good decision and aggregate, with `stale` set once the
    /// last successful tick is older than two periods.
    pub fn get_status(&self) -> StatusReport {
        let reg = self.state.regulation();
        let mode = self.state.mode();
        let subs = self.state.subsystems();
        let outcome = self.state.last_outcome();

        let stale = match outcome.completed_at {
            Some(at) => at.elapsed() > self.tick_period * timing::STALE_AFTER_TICKS,
            None => true,
        };
        let decision = outcome.decision.unwrap_or(RelayDecision::NoData);

        StatusReport {
            aggregate: outcome.aggregate,
            setpoint_f: reg.setpoint_f,
            gains: reg.gains,
            pid_value: outcome.pid_value,
            decision,
            decision_label: decision.to_string(),
            mode: mode.as_wire(),
            selected_sensor: mode.selected_sensor().map(str::to_string),
            manual_override: self.state.manual_override(),
            heating_enabled: subs.heating,
            cooling_enabled: subs.cooling,
            stale,
            sensors: self.sensors.lock().recent(),
        }
    }

    pub fn set_setpoint(&self, setpoint_f: f64) -> Result<()> {
        let setpoint_f = validation::validate_setpoint(setpoint_f)?;
        self.state.set_setpoint(setpoint_f);
        set_best_effort(&*self.store, keys::SETPOINT_F, &setpoint_f.to_string());
        info!(setpoint_f, "Setpoint updated");
        Ok(())
    }

    /// Update gains (and optionally the setpoint) atomically. The running
    /// regulator picks the new gains up on its next tick; integral history
    /// is preserved by design.
    pub fn set_pid_gains(&self, kp: f64, ki: f64, kd: f64, setpoint_f: Option<f64>) -> Result<()> {
        let gains = PidGains {
            kp: validation::validate_gain("Kp", kp)?,
            ki: validation::validate_gain("Ki", ki)?,
            kd: validation::validate_gain("Kd", kd)?,
        };
        let setpoint_f = setpoint_f.map(validation::validate_setpoint).transpose()?;

        self.state.set_regulation(gains, setpoint_f);

        set_best_effort(&*self.store, keys::KP, &gains.kp.to_string());
        set_best_effort(&*self.store, keys::KI, &gains.ki.to_string());
        set_best_effort(&*self.store, keys::KD, &gains.kd.to_string());
        if let Some(sp) = setpoint_f {
            set_best_effort(&*self.store, keys::SETPOINT_F, &sp.to_string());
        }
        info!(kp, ki, kd, ?setpoint_f, "PID parameters updated");
        Ok(())
    }

    /// Select the aggregation mode. `Specific` requires the named sensor to
    /// have at least one historical reading.
    pub fn set_mode(&self, mode: AggregationMode) -> Result<()> {
        if let AggregationMode::Specific(name) = &mode {
            validation::validate_sensor_name(name)?;
            if !self.sensors.lock().has_readings(name) {
                return Err(ControlError::InvalidModeSelection(name.clone()));
            }
        }

        set_best_effort(&*self.store, keys::MODE, mode.as_wire());
        set_best_effort(
            &*self.store,
            keys::SELECTED_SENSOR,
            mode.selected_sensor().unwrap_or(""),
        );
        info!(mode = mode.as_wire(), sensor = ?mode.selected_sensor(), "Aggregation mode updated");
        self.state.set_mode(mode);
        Ok(())
    }

    /// Assert or clear the manual override. Asserting forces an immediate
    /// all-off rather than waiting for the next tick.
    pub fn set_override(&self, active: bool) -> Result<()> {
        self.state.set_manual_override(active);
        set_best_effort(&*self.store, keys::OVERRIDE, if active { "true" } else { "false" });

        if active {
            let mut actuator = self.actuator.lock();
            actuator.all_off()?;
            self.state.publish_manual(RelayDecision::SystemOff);
        }
        info!(active, "Manual override changed");
        Ok(())
    }

    pub fn set_subsystem_enable(&self, heating: Option<bool>, cooling: Option<bool>) -> Result<()> {
        let flags = self.state.set_subsystems(heating, cooling);
        set_best_effort(
            &*self.store,
            keys::HEATING_ENABLED,
            if flags.heating { "true" } else { "false" },
        );
        set_best_effort(
            &*self.store,
            keys::COOLING_ENABLED,
            if flags.cooling { "true" } else { "false" },
        );
        info!(
            heating_enabled = flags.heating,
            cooling_enabled = flags.cooling,
            "Subsystem enables updated"
        );
        Ok(())
    }

    /// Drive the relays by hand. Sets the override flag as a side effect so
    /// the control loop stands down, and holds the actuator lock for the
    /// whole application so it cannot race an in-flight automatic decision.
    pub fn manual_actuate(&self, command: ManualCommand) -> Result<()> {
        self.state.set_manual_override(true);
        set_best_effort(&*self.store, keys::OVERRIDE, "true");

        let decision = command.decision();
        {
            let mut actuator = self.actuator.lock();
            apply_outputs(actuator.as_mut(), decision.outputs())?;
        }
        self.state.publish_manual(decision);
        set_best_effort(&*self.store, keys::LAST_DECISION, &decision.to_string());
        info!(?command, "Manual actuation applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::persistence::JsonFileStore;
    use crate::hw::actuator::MockRelayActuator;
    use std::time::Duration;

    fn harness(actuator: MockRelayActuator) -> (Thermostat, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path().join("state.json")).unwrap());
        let thermostat = Thermostat::new(
            Arc::new(ControlState::new()),
            Arc::new(Mutex::new(SensorStore::new())),
            Arc::new(Mutex::new(Box::new(actuator))),
            store,
        );
        (thermostat, dir)
    }

    fn quiet_actuator() -> MockRelayActuator {
        let mut mock = MockRelayActuator::new();
        mock.expect_set_heating().returning(|_| Ok(()));
        mock.expect_set_cooling().returning(|_| Ok(()));
        mock.expect_set_fan().returning(|_| Ok(()));
        mock.expect_all_off().returning(|| Ok(()));
        mock
    }

    #[test]
    fn status_is_idempotent_between_writes() {
        let (t, _dir) = harness(quiet_actuator());
        t.submit_reading("a", 70.0, 40.0, None).unwrap();

        let first = t.get_status();
        let second = t.get_status();
        assert_eq!(first.setpoint_f, second.setpoint_f);
        assert_eq!(first.decision, second.decision);
        assert_eq!(first.mode, second.mode);
        assert_eq!(first.sensors.len(), second.sensors.len());
        // stale is explicitly time-varying and exempt from idempotence
    }

    #[test]
    fn status_before_first_tick_is_well_formed_and_stale() {
        let (t, _dir) = harness(quiet_actuator());
        let status = t.get_status();
        assert!(status.stale);
        assert_eq!(status.decision, RelayDecision::NoData);
        assert!(status.aggregate.is_none());
        assert_eq!(status.setpoint_f, 70.0);
    }

    #[test]
    fn specific_mode_requires_history() {
        let (t, _dir) = harness(quiet_actuator());
        let err = t.set_mode(AggregationMode::Specific("porch".into())).unwrap_err();
        assert!(matches!(err, ControlError::InvalidModeSelection(_)));
        assert_eq!(t.state().mode(), AggregationMode::Average);

        t.submit_reading("porch", 68.0, 40.0, None).unwrap();
        t.set_mode(AggregationMode::Specific("porch".into())).unwrap();
        assert_eq!(t.state().mode(), AggregationMode::Specific("porch".into()));
    }

    #[test]
    fn invalid_gains_leave_state_untouched() {
        let (t, _dir) = harness(quiet_actuator());
        let before = t.state().regulation();
        assert!(t.set_pid_gains(1.0, f64::NAN, 0.0, Some(72.0)).is_err());
        assert_eq!(t.state().regulation(), before);
    }

    #[test]
    fn manual_actuate_sets_override_and_drives_relays() {
        let mut mock = MockRelayActuator::new();
        mock.expect_set_cooling().returning(|_| Ok(()));
        mock.expect_set_heating()
            .with(mockall::predicate::eq(true))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_set_fan()
            .with(mockall::predicate::eq(true))
            .times(1)
            .returning(|_| Ok(()));

        let (t, _dir) = harness(mock);
        t.manual_actuate(ManualCommand::Heating).unwrap();
        assert!(t.state().manual_override());
        assert_eq!(
            t.state().last_outcome().decision,
            Some(RelayDecision::Heating)
        );
    }

    #[test]
    fn override_on_forces_all_off_immediately() {
        let mut mock = MockRelayActuator::new();
        mock.expect_all_off().times(1).returning(|| Ok(()));

        let (t, _dir) = harness(mock);
        t.set_override(true).unwrap();
        assert!(t.state().manual_override());
        assert_eq!(
            t.state().last_outcome().decision,
            Some(RelayDecision::SystemOff)
        );
    }

    #[test]
    fn rejected_reading_never_reaches_the_store() {
        let (t, _dir) = harness(quiet_actuator());
        assert!(t.submit_reading("a", f64::NAN, 40.0, None).is_err());
        assert!(t.submit_reading("bad name", 70.0, 40.0, None).is_err());
        assert!(t.submit_reading("a", 70.0, 140.0, None).is_err());
        assert!(!t.sensors().lock().has_readings("a"));
    }

    #[test]
    fn staleness_flag_trips_after_two_periods() {
        let (t, _dir) = harness(quiet_actuator());
        let t = t.with_tick_period(Duration::from_millis(10));

        t.state().publish_tick(RelayDecision::Idle, None, Some(0.0));
        assert!(!t.get_status().stale);

        std::thread::sleep(Duration::from_millis(30));
        assert!(t.get_status().stale);
    }
}
