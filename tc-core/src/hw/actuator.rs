//! Relay actuation
//!
//! Low-level write operations for the heating/cooling/fan relay bank.
//!
//! # Invariant
//!
//! Heating and cooling are never asserted simultaneously. `apply_outputs`
//! enforces write ordering (deassert the opposing branch before asserting)
//! so even a failure mid-application cannot leave both energized. All writes
//! are serialized behind one lock owned by the caller: only the control loop
//! or a manual-control handler holding that lock may touch relay state.

use std::fs;
use std::path::PathBuf;

use crate::constants::gpio;
use crate::data::types::RelayOutputs;
use crate::error::{ControlError, Result};

/// Relay bank collaborator. Implementations must treat each write as
/// fallible and bounded (sysfs writes, a driver call behind a short timeout).
#[cfg_attr(test, mockall::automock)]
pub trait RelayActuator: Send {
    fn set_heating(&mut self, on: bool) -> Result<()>;
    fn set_cooling(&mut self, on: bool) -> Result<()>;
    fn set_fan(&mut self, on: bool) -> Result<()>;

    /// Force every relay off. Used for no-data ticks, failed ticks, manual
    /// off, and the mandatory shutdown cleanup.
    fn all_off(&mut self) -> Result<()> {
        self.set_heating(false)?;
        self.set_cooling(false)?;
        self.set_fan(false)
    }
}

/// Apply a decision's outputs with safe ordering: deassert first, assert
/// last, fan only once a branch is known to be on.
pub fn apply_outputs(actuator: &mut dyn RelayActuator, outputs: RelayOutputs) -> Result<()> {
    debug_assert!(!(outputs.heating && outputs.cooling));

    if !outputs.heating {
        actuator.set_heating(false)?;
    }
    if !outputs.cooling {
        actuator.set_cooling(false)?;
    }
    if !outputs.fan {
        actuator.set_fan(false)?;
    }

    if outputs.heating {
        actuator.set_heating(true)?;
    }
    if outputs.cooling {
        actuator.set_cooling(true)?;
    }
    if outputs.fan {
        actuator.set_fan(true)?;
    }
    Ok(())
}

/// Relay bank driven through exported sysfs GPIO value files
pub struct SysfsGpioRelays {
    heating_path: PathBuf,
    cooling_path: PathBuf,
    fan_path: PathBuf,
}

impl SysfsGpioRelays {
    /// Relay bank at the default BCM 17/27/22 value files
    pub fn new() -> Self {
        Self::with_paths(gpio::HEATING_VALUE, gpio::COOLING_VALUE, gpio::FAN_VALUE)
    }

    pub fn with_paths(
        heating: impl Into<PathBuf>,
        cooling: impl Into<PathBuf>,
        fan: impl Into<PathBuf>,
    ) -> Self {
        Self {
            heating_path: heating.into(),
            cooling_path: cooling.into(),
            fan_path: fan.into(),
        }
    }

    fn write_line(path: &PathBuf, relay: &'static str, on: bool) -> Result<()> {
        let value = if on { "1" } else { "0" };
        fs::write(path, value).map_err(|e| ControlError::ActuatorWrite {
            relay,
            reason: format!("{}: {e}", path.display()),
        })
    }
}

impl Default for SysfsGpioRelays {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayActuator for SysfsGpioRelays {
    fn set_heating(&mut self, on: bool) -> Result<()> {
        Self::write_line(&self.heating_path, "heating", on)
    }

    fn set_cooling(&mut self, on: bool) -> Result<()> {
        Self::write_line(&self.cooling_path, "cooling", on)
    }

    fn set_fan(&mut self, on: bool) -> Result<()> {
        Self::write_line(&self.fan_path, "fan", on)
    }
}
