//! Relay actuation policy
//!
//! A pure decision function: every tick re-derives the `RelayDecision` from
//! current inputs, with no carried state. Rules are evaluated in priority
//! order and the first match wins:
//!
//! 1. No aggregate temperature -> `NoData`
//! 2. Manual override -> `SystemOff` (beats seasonal and subsystem flags)
//! 3. Seasonal lockout (summer blocks heat calls, winter blocks cool calls)
//! 4. Heat call past the deadband, gated on `heating_enabled`
//! 5. Cool call past the deadband, gated on `cooling_enabled`
//! 6. `Idle`
//!
//! A "call" requires the signal magnitude to exceed the deadband; a signal
//! inside the deadband is Idle even in a lockout month.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constants::policy as policy_const;
use crate::data::types::RelayDecision;
use crate::error::{ControlError, Result};

/// Operator-adjustable policy configuration. Fields omitted from a policy
/// file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayPolicy {
    /// Signal magnitude below which no actuation occurs
    pub deadband: f64,
    /// Months (1-12) in which heat calls are locked out
    pub summer_months: BTreeSet<u32>,
    /// Months (1-12) in which cool calls are locked out
    pub winter_months: BTreeSet<u32>,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            deadband: policy_const::DEFAULT_DEADBAND,
            summer_months: policy_const::DEFAULT_SUMMER_MONTHS.into_iter().collect(),
            winter_months: policy_const::DEFAULT_WINTER_MONTHS.into_iter().collect(),
        }
    }
}

impl RelayPolicy {
    /// Reject a policy no decision could sensibly be derived from.
    pub fn validate(&self) -> Result<()> {
        if !self.deadband.is_finite() || self.deadband < 0.0 {
            return Err(ControlError::invalid_input(
                "deadband",
                format!("must be a finite non-negative value, got {}", self.deadband),
            ));
        }
        for month in self.summer_months.iter().chain(&self.winter_months) {
            if !(1..=12).contains(month) {
                return Err(ControlError::invalid_input(
                    "lockout month",
                    format!("must be 1-12, got {month}"),
                ));
            }
        }
        Ok(())
    }
}

/// Flag snapshot a decision is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyFlags {
    pub manual_override: bool,
    pub heating_enabled: bool,
    pub cooling_enabled: bool,
}

/// Derive the actuation decision for one tick.
///
/// `signal` is the signed PID output (`None` on a no-data tick); `month` is
/// the current wall-clock month (1-12), recomputed by the caller every tick.
pub fn decide(
    policy: &RelayPolicy,
    signal: Option<f64>,
    month: u32,
    flags: PolicyFlags,
) -> RelayDecision {
    let signal = match signal {
        Some(s) => s,
        None => return RelayDecision::NoData,
    };

    if flags.manual_override {
        return RelayDecision::SystemOff;
    }

    let heat_call = signal < -policy.deadband;
    let cool_call = signal > policy.deadband;

    if heat_call && policy.summer_months.contains(&month) {
        return RelayDecision::SeasonalLockoutHeating;
    }
    if cool_call && policy.winter_months.contains(&month) {
        return RelayDecision::SeasonalLockoutCooling;
    }

    if heat_call {
        return if flags.heating_enabled {
            RelayDecision::Heating
        } else {
            RelayDecision::SubsystemDisabledIdle
        };
    }
    if cool_call {
        return if flags.cooling_enabled {
            RelayDecision::Cooling
        } else {
            RelayDecision::SubsystemDisabledIdle
        };
    }

    RelayDecision::Idle
}
