//! Core data types for thermactl
//!
//! Defines all the primary data structures used throughout the application.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One temperature/humidity sample from a sensor. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub timestamp: SystemTime,
    /// Temperature in °F (converted at the sampling boundary)
    pub temperature_f: f64,
    /// Relative humidity, 0-100 %
    pub humidity: f64,
}

/// Windowed mean over one or more sensor series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregate {
    pub temperature_f: f64,
    pub humidity: f64,
    pub sample_count: usize,
}

/// PID gain triple, live-tunable between ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: crate::constants::defaults::KP,
            ki: crate::constants::defaults::KI,
            kd: crate::constants::defaults::KD,
        }
    }
}

/// Which readings feed the regulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationMode {
    /// Flat mean over every series
    Average,
    /// Follow one named sensor
    Specific(String),
}

impl AggregationMode {
    /// Wire name used in status reports and the state store
    pub fn as_wire(&self) -> &'static str {
        match self {
            AggregationMode::Average => "average",
            AggregationMode::Specific(_) => "specific",
        }
    }

    pub fn selected_sensor(&self) -> Option<&str> {
        match self {
            AggregationMode::Average => None,
            AggregationMode::Specific(name) => Some(name),
        }
    }
}

/// Outcome of one relay policy evaluation.
///
/// Re-derived every tick from current inputs; there is no carried state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayDecision {
    Heating,
    Cooling,
    Idle,
    /// Manual override active
    SystemOff,
    /// Heat call suppressed by the summer calendar
    SeasonalLockoutHeating,
    /// Cool call suppressed by the winter calendar
    SeasonalLockoutCooling,
    /// A call was made but its subsystem is disabled
    SubsystemDisabledIdle,
    /// No qualifying readings in the aggregation window
    NoData,
}

impl RelayDecision {
    /// All variants, for exhaustive invariant checks
    pub const ALL: [RelayDecision; 8] = [
        RelayDecision::Heating,
        RelayDecision::Cooling,
        RelayDecision::Idle,
        RelayDecision::SystemOff,
        RelayDecision::SeasonalLockoutHeating,
        RelayDecision::SeasonalLockoutCooling,
        RelayDecision::SubsystemDisabledIdle,
        RelayDecision::NoData,
    ];

    /// Relay outputs this decision maps to. Only `Heating` and `Cooling`
    /// energize anything; fan runs iff heat or cool does.
    pub fn outputs(self) -> RelayOutputs {
        match self {
            RelayDecision::Heating => RelayOutputs {
                heating: true,
                cooling: false,
                fan: true,
            },
            RelayDecision::Cooling => RelayOutputs {
                heating: false,
                cooling: true,
                fan: true,
            },
            _ => RelayOutputs::OFF,
        }
    }
}

impl std::fmt::Display for RelayDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RelayDecision::Heating => "Heating",
            RelayDecision::Cooling => "Cooling",
            RelayDecision::Idle => "Idle",
            RelayDecision::SystemOff => "System Off",
            RelayDecision::SeasonalLockoutHeating => "Seasonal Lockout (Heating)",
            RelayDecision::SeasonalLockoutCooling => "Seasonal Lockout (Cooling)",
            RelayDecision::SubsystemDisabledIdle => "Idle (Subsystem Disabled)",
            RelayDecision::NoData => "No Data",
        };
        f.write_str(label)
    }
}

/// Physical relay lines to assert for a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayOutputs {
    pub heating: bool,
    pub cooling: bool,
    pub fan: bool,
}

impl RelayOutputs {
    pub const OFF: RelayOutputs = RelayOutputs {
        heating: false,
        cooling: false,
        fan: false,
    };

    pub fn any_active(self) -> bool {
        self.heating || self.cooling || self.fan
    }
}

/// Manual actuation request (sets the override flag as a side effect)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualCommand {
    Off,
    Heating,
    Cooling,
}

impl ManualCommand {
    pub fn decision(self) -> RelayDecision {
        match self {
            ManualCommand::Off => RelayDecision::SystemOff,
            ManualCommand::Heating => RelayDecision::Heating,
            ManualCommand::Cooling => RelayDecision::Cooling,
        }
    }
}

/// One reading as reported in a status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingSample {
    /// Unix timestamp, seconds
    pub timestamp: u64,
    pub temperature_f: f64,
    pub humidity: f64,
}

impl From<SensorReading> for ReadingSample {
    fn from(r: SensorReading) -> Self {
        Self {
            timestamp: r
                .timestamp
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            temperature_f: r.temperature_f,
            humidity: r.humidity,
        }
    }
}

/// Full status snapshot for the request-handling layer.
///
/// Always well-formed: carries the last-known-good decision and aggregate
/// even when the most recent tick failed, with `stale` flagging the gap.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub aggregate: Option<Aggregate>,
    pub setpoint_f: f64,
    pub gains: PidGains,
    pub pid_value: Option<f64>,
    pub decision: RelayDecision,
    pub decision_label: String,
    pub mode: &'static str,
    pub selected_sensor: Option<String>,
    pub manual_override: bool,
    pub heating_enabled: bool,
    pub cooling_enabled: bool,
    pub stale: bool,
    pub sensors: HashMap<String, Vec<ReadingSample>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_never_assert_heat_and_cool_together() {
        for decision in RelayDecision::ALL {
            let out = decision.outputs();
            assert!(
                !(out.heating && out.cooling),
                "{decision:?} asserts heat and cool simultaneously"
            );
        }
    }

    #[test]
    fn fan_runs_iff_heat_or_cool() {
        for decision in RelayDecision::ALL {
            let out = decision.outputs();
            assert_eq!(out.fan, out.heating || out.cooling, "{decision:?}");
        }
    }

    #[test]
    fn decision_labels_match_legacy_names() {
        assert_eq!(RelayDecision::SystemOff.to_string(), "System Off");
        assert_eq!(RelayDecision::NoData.to_string(), "No Data");
        assert_eq!(RelayDecision::Heating.to_string(), "Heating");
    }
}
