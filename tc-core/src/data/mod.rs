//! Data types, validation, and persistence
//!
//! - `types` - Core data structures (readings, gains, modes, decisions)
//! - `validation` - Input validation at the request-handler boundary
//! - `persistence` - Key-value state store trait and JSON file implementation

pub mod persistence;
pub mod types;
pub mod validation;

pub use persistence::{JsonFileStore, StateStore, keys};
pub use types::{
    Aggregate, AggregationMode, ManualCommand, PidGains, ReadingSample, RelayDecision,
    RelayOutputs, SensorReading, StatusReport,
};
pub use validation::{
    validate_gain, validate_humidity, validate_reading_temperature, validate_sensor_name,
    validate_setpoint,
};
