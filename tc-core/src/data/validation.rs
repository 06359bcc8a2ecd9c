//! Input validation for thermactl
//!
//! Request-handler input is validated here, before it reaches the sensor
//! store or control state. The core components themselves assume numeric
//! input is already well-formed.
//!
//! Always validate untrusted input before storing it or acting on it.

use crate::constants::limits;
use crate::error::{ControlError, Result};

/// Validates a requested setpoint temperature (°F)
pub fn validate_setpoint(value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(ControlError::InvalidTemperature { value });
    }
    if !(limits::SETPOINT_MIN_F..=limits::SETPOINT_MAX_F).contains(&value) {
        return Err(ControlError::invalid_input(
            "setpoint",
            format!(
                "{value}°F outside {}..{}°F",
                limits::SETPOINT_MIN_F,
                limits::SETPOINT_MAX_F
            ),
        ));
    }
    Ok(value)
}

/// Validates a submitted reading temperature (°F)
pub fn validate_reading_temperature(value: f64) -> Result<f64> {
    if !value.is_finite() || !(limits::READING_MIN_F..=limits::READING_MAX_F).contains(&value) {
        return Err(ControlError::InvalidTemperature { value });
    }
    Ok(value)
}

/// Validates a relative humidity percentage
pub fn validate_humidity(value: f64) -> Result<f64> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ControlError::InvalidHumidity { value });
    }
    Ok(value)
}

/// Validates a PID gain (finite and non-negative)
pub fn validate_gain(name: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(ControlError::invalid_input(
            name,
            format!("{value} is not a usable gain"),
        ));
    }
    Ok(value)
}

/// Validates a sensor series name: non-empty, bounded length, safe charset
pub fn validate_sensor_name(name: &str) -> Result<&str> {
    if name.is_empty() || name.len() > limits::MAX_SENSOR_NAME_LEN {
        return Err(ControlError::InvalidSensorName(name.to_string()));
    }
    let safe = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !safe {
        return Err(ControlError::InvalidSensorName(name.to_string()));
    }
    Ok(name)
}
