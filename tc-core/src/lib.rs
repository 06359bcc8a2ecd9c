//! thermactl Core Library
//!
//! Single-zone thermal regulation: sensor aggregation, PID control, and a
//! relay actuation policy with manual-override and seasonal-lockout rules.
//!
//! # Module Structure
//!
//! - `sensors` - Per-sensor reading series with windowed aggregation
//! - `engine/` - PID regulator and relay decision policy
//! - `state` - Shared control state with field-group locking
//! - `hw/` - Relay actuator and onboard sensor collaborator interfaces
//! - `data/` - Data types, validation, key-value persistence
//! - `service` - Operations exposed to the request-handling layer
//!
//! # Data flow
//!
//! raw readings -> [`SensorStore`] -> aggregate -> [`PidRegulator`] ->
//! [`engine::relay::decide`] -> actuator + [`ControlState`] -> status readers

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod sensors;
pub mod service;
pub mod state;

// Re-export the error crate the way collaborating crates consume it
pub use tc_error as error;
pub use tc_error::{ControlError, Result};

// Re-export primary types from data/
pub use data::{
    Aggregate, AggregationMode, JsonFileStore, ManualCommand, PidGains, ReadingSample,
    RelayDecision, RelayOutputs, SensorReading, StateStore, StatusReport,
};

// Re-export validation functions from data/
pub use data::{
    validate_gain, validate_humidity, validate_reading_temperature, validate_sensor_name,
    validate_setpoint,
};

// Re-export engine types
pub use engine::{PidRegulator, PolicyFlags, RelayPolicy};

// Re-export hardware interfaces from hw/
pub use hw::{
    IioSensor, RelayActuator, SensorReader, SysfsGpioRelays, apply_outputs,
    fahrenheit_from_celsius,
};

pub use sensors::SensorStore;
pub use service::Thermostat;
pub use state::{ControlState, RegulationSettings, SubsystemEnable, TickOutcome};
