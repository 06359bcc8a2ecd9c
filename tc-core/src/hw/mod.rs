//! Hardware collaborator interfaces
//!
//! - `actuator` - Relay bank trait and sysfs GPIO implementation
//! - `sensor` - Onboard temperature/humidity reader trait and IIO implementation
//!
//! The core treats both as fallible external collaborators: a failed read or
//! write is contained to the tick that hit it.

pub mod actuator;
pub mod sensor;

pub use actuator::{RelayActuator, SysfsGpioRelays, apply_outputs};
pub use sensor::{IioSensor, SensorReader, fahrenheit_from_celsius};
