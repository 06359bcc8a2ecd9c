//! Shared control state
//!
//! The single source of truth for setpoint, gains, aggregation mode,
//! override, subsystem enables, and the last tick outcome. One process-wide
//! instance is created at startup (seeded from the state store) and shared
//! by handle with the control loop and the request-handling layer - never
//! ambient globals.
//!
//! Synchronization is per logically-independent field group, so a slow
//! status reader never stalls a setpoint update and no lock is ever held
//! across actuator or persistence I/O:
//! - setpoint + gains (one lock: they change together via the PID endpoint)
//! - aggregation mode + selected sensor
//! - manual override (atomic)
//! - subsystem enables
//! - last tick outcome
//!
//! The seasonal lock is derived from the wall-clock month on every tick and
//! is deliberately not represented here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::info;

use crate::constants::defaults;
use crate::data::persistence::{self, StateStore, keys};
use crate::data::types::{Aggregate, AggregationMode, PidGains, RelayDecision};

/// Setpoint and gains, updated together by parameter requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulationSettings {
    pub setpoint_f: f64,
    pub gains: PidGains,
}

impl Default for RegulationSettings {
    fn default() -> Self {
        Self {
            setpoint_f: defaults::SETPOINT_F,
            gains: PidGains::default(),
        }
    }
}

/// Independently disabled actuation branches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemEnable {
    pub heating: bool,
    pub cooling: bool,
}

impl Default for SubsystemEnable {
    fn default() -> Self {
        Self {
            heating: true,
            cooling: true,
        }
    }
}

/// Published result of the most recent control tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickOutcome {
    pub decision: Option<RelayDecision>,
    pub aggregate: Option<Aggregate>,
    pub pid_value: Option<f64>,
    /// Set only by successful ticks; drives the staleness flag
    pub completed_at: Option<Instant>,
}

/// Process-lifetime shared control state
pub struct ControlState {
    regulation: RwLock<RegulationSettings>,
    mode: RwLock<AggregationMode>,
    manual_override: AtomicBool,
    subsystems: RwLock<SubsystemEnable>,
    last_outcome: RwLock<TickOutcome>,
}

impl ControlState {
    /// Fresh state with documented defaults: setpoint 70°F, Average mode,
    /// override off, both subsystems enabled.
    pub fn new() -> Self {
        Self {
            regulation: RwLock::new(RegulationSettings::default()),
            mode: RwLock::new(AggregationMode::Average),
            manual_override: AtomicBool::new(false),
            subsystems: RwLock::new(SubsystemEnable::default()),
            last_outcome: RwLock::new(TickOutcome::default()),
        }
    }

    /// Seed from the persistent store, falling back per key to defaults.
    pub fn seed_from(store: &dyn StateStore) -> Self {
        let state = Self::new();

        {
            let mut reg = state.regulation.write();
            reg.setpoint_f = persistence::read_f64(store, keys::SETPOINT_F, defaults::SETPOINT_F);
            reg.gains = PidGains {
                kp: persistence::read_f64(store, keys::KP, defaults::KP),
                ki: persistence::read_f64(store, keys::KI, defaults::KI),
                kd: persistence::read_f64(store, keys::KD, defaults::KD),
            };
        }

        // Specific mode only survives a restart if a sensor name was stored;
        // sensor history is gone, so the first ticks may report NoData until
        // that sensor reports again.
        let mode = match store.get(keys::MODE).ok().flatten().as_deref() {
            Some("specific") => match store.get(keys::SELECTED_SENSOR).ok().flatten() {
                Some(name) if !name.is_empty() => AggregationMode::Specific(name),
                _ => AggregationMode::Average,
            },
            _ => AggregationMode::Average,
        };
        *state.mode.write() = mode;

        state.manual_override.store(
            persistence::read_bool(store, keys::OVERRIDE, false),
            Ordering::SeqCst,
        );
        *state.subsystems.write() = SubsystemEnable {
            heating: persistence::read_bool(store, keys::HEATING_ENABLED, true),
            cooling: persistence::read_bool(store, keys::COOLING_ENABLED, true),
        };

        let reg = state.regulation.read();
        info!(
            setpoint_f = reg.setpoint_f,
            kp = reg.gains.kp,
            ki = reg.gains.ki,
            kd = reg.gains.kd,
            override_active = state.manual_override.load(Ordering::SeqCst),
            "Control state seeded from store"
        );
        drop(reg);

        state
    }

    // ------------------------------------------------------------------
    // Setpoint + gains
    // ------------------------------------------------------------------

    pub fn regulation(&self) -> RegulationSettings {
        *self.regulation.read()
    }

    pub fn set_setpoint(&self, setpoint_f: f64) {
        self.regulation.write().setpoint_f = setpoint_f;
    }

    /// All-or-nothing: callers validate before this mutates anything.
    pub fn set_regulation(&self, gains: PidGains, setpoint_f: Option<f64>) {
        let mut reg = self.regulation.write();
        reg.gains = gains;
        if let Some(sp) = setpoint_f {
            reg.setpoint_f = sp;
        }
    }

    // ------------------------------------------------------------------
    // Aggregation mode
    // ------------------------------------------------------------------

    pub fn mode(&self) -> AggregationMode {
        self.mode.read().clone()
    }

    pub fn set_mode(&self, mode: AggregationMode) {
        *self.mode.write() = mode;
    }

    // ------------------------------------------------------------------
    // Override and subsystem flags
    // ------------------------------------------------------------------

    pub fn manual_override(&self) -> bool {
        self.manual_override.load(Ordering::SeqCst)
    }

    pub fn set_manual_override(&self, active: bool) {
        self.manual_override.store(active, Ordering::SeqCst);
    }

    pub fn subsystems(&self) -> SubsystemEnable {
        *self.subsystems.read()
    }

    pub fn set_subsystems(&self, heating: Option<bool>, cooling: Option<bool>) -> SubsystemEnable {
        let mut flags = self.subsystems.write();
        if let Some(h) = heating {
            flags.heating = h;
        }
        if let Some(c) = cooling {
            flags.cooling = c;
        }
        *flags
    }

    // ------------------------------------------------------------------
    // Last tick outcome
    // ------------------------------------------------------------------

    pub fn last_outcome(&self) -> TickOutcome {
        *self.last_outcome.read()
    }

    /// Publish a successful tick (stamps `completed_at`).
    pub fn publish_tick(
        &self,
        decision: RelayDecision,
        aggregate: Option<Aggregate>,
        pid_value: Option<f64>,
    ) {
        *self.last_outcome.write() = TickOutcome {
            decision: Some(decision),
            aggregate,
            pid_value,
            completed_at: Some(Instant::now()),
        };
    }

    /// Record a manually commanded decision without claiming a fresh
    /// aggregate (manual control bypasses the measurement path).
    pub fn publish_manual(&self, decision: RelayDecision) {
        let mut outcome = self.last_outcome.write();
        outcome.decision = Some(decision);
        outcome.completed_at = Some(Instant::now());
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::persistence::JsonFileStore;

    #[test]
    fn defaults_match_documented_values() {
        let state = ControlState::new();
        let reg = state.regulation();
        assert_eq!(reg.setpoint_f, 70.0);
        assert_eq!(reg.gains, PidGains { kp: 0.5, ki: 0.1, kd: 0.01 });
        assert_eq!(state.mode(), AggregationMode::Average);
        assert!(!state.manual_override());
        let subs = state.subsystems();
        assert!(subs.heating && subs.cooling);
    }

    #[test]
    fn seed_falls_back_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("state.json")).unwrap();
        store.set(keys::SETPOINT_F, "68.0").unwrap();
        store.set(keys::HEATING_ENABLED, "false").unwrap();

        let state = ControlState::seed_from(&store);
        assert_eq!(state.regulation().setpoint_f, 68.0);
        assert!(!state.subsystems().heating);
        // Unset keys keep their defaults
        assert!(state.subsystems().cooling);
        assert_eq!(state.regulation().gains.kp, 0.5);
    }

    #[test]
    fn seed_restores_specific_mode_only_with_a_sensor_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("state.json")).unwrap();
        store.set(keys::MODE, "specific").unwrap();

        let state = ControlState::seed_from(&store);
        assert_eq!(state.mode(), AggregationMode::Average);

        store.set(keys::SELECTED_SENSOR, "porch").unwrap();
        let state = ControlState::seed_from(&store);
        assert_eq!(state.mode(), AggregationMode::Specific("porch".into()));
    }

    #[test]
    fn partial_subsystem_update_leaves_other_flag_alone() {
        let state = ControlState::new();
        let flags = state.set_subsystems(Some(false), None);
        assert!(!flags.heating);
        assert!(flags.cooling);
    }

    #[test]
    fn publish_manual_keeps_last_aggregate() {
        let state = ControlState::new();
        state.publish_tick(
            RelayDecision::Idle,
            Some(Aggregate {
                temperature_f: 70.0,
                humidity: 40.0,
                sample_count: 3,
            }),
            Some(0.2),
        );
        state.publish_manual(RelayDecision::SystemOff);
        let outcome = state.last_outcome();
        assert_eq!(outcome.decision, Some(RelayDecision::SystemOff));
        assert!(outcome.aggregate.is_some());
    }
}
