//! Onboard sensor reading
//!
//! Reads the local temperature/humidity sensor through Linux IIO sysfs
//! attributes: temperature in millidegrees Celsius, relative humidity in
//! millipercent. The sampling loop converts to °F before ingesting, matching
//! the unit every other part of the system works in.

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::sensor as sensor_const;
use crate::error::{ControlError, Result};

/// Onboard temperature/humidity collaborator.
/// Returns (temperature °C, relative humidity %).
#[cfg_attr(test, mockall::automock)]
pub trait SensorReader: Send {
    fn read(&mut self) -> Result<(f64, f64)>;
}

/// °C to °F, rounded to two decimals at the sampling boundary
pub fn fahrenheit_from_celsius(celsius: f64) -> f64 {
    let f = celsius * 9.0 / 5.0 + 32.0;
    (f * 100.0).round() / 100.0
}

/// IIO sysfs-backed sensor
pub struct IioSensor {
    temp_path: PathBuf,
    humidity_path: PathBuf,
}

impl IioSensor {
    pub fn new() -> Self {
        Self::with_paths(sensor_const::TEMP_INPUT, sensor_const::HUMIDITY_INPUT)
    }

    pub fn with_paths(temp: impl Into<PathBuf>, humidity: impl Into<PathBuf>) -> Self {
        Self {
            temp_path: temp.into(),
            humidity_path: humidity.into(),
        }
    }

    /// Whether both attributes exist (controls whether the daemon starts a
    /// sampling loop at all).
    pub fn is_present(&self) -> bool {
        self.temp_path.exists() && self.humidity_path.exists()
    }

    fn read_milli(path: &Path) -> Result<f64> {
        let content = fs::read_to_string(path).map_err(|e| {
            ControlError::sensor_read(path.display().to_string(), e.to_string())
        })?;
        let milli: f64 = content.trim().parse().map_err(|e| {
            ControlError::sensor_read(
                path.display().to_string(),
                format!("unparseable value {:?}: {e}", content.trim()),
            )
        })?;
        Ok(milli / 1000.0)
    }
}

impl Default for IioSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorReader for IioSensor {
    fn read(&mut self) -> Result<(f64, f64)> {
        let celsius = Self::read_milli(&self.temp_path)?;
        let humidity = Self::read_milli(&self.humidity_path)?;
        if !celsius.is_finite() || !humidity.is_finite() {
            return Err(ControlError::sensor_read(
                self.temp_path.display().to_string(),
                "non-finite reading",
            ));
        }
        Ok((celsius, humidity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn celsius_conversion_rounds_to_two_decimals() {
        assert_eq!(fahrenheit_from_celsius(0.0), 32.0);
        assert_eq!(fahrenheit_from_celsius(100.0), 212.0);
        assert_eq!(fahrenheit_from_celsius(21.111), 70.0);
        assert_eq!(fahrenheit_from_celsius(20.5), 68.9);
    }

    #[test]
    fn reads_millidegree_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let t = dir.path().join("in_temp_input");
        let h = dir.path().join("in_humidityrelative_input");
        fs::write(&t, "21500\n").unwrap();
        fs::write(&h, "43200\n").unwrap();

        let mut sensor = IioSensor::with_paths(&t, &h);
        assert!(sensor.is_present());
        let (c, rh) = sensor.read().unwrap();
        assert_eq!(c, 21.5);
        assert_eq!(rh, 43.2);
    }

    #[test]
    fn unreadable_attribute_is_a_sensor_read_error() {
        let mut sensor = IioSensor::with_paths("/nonexistent/t", "/nonexistent/h");
        assert!(!sensor.is_present());
        assert!(matches!(
            sensor.read().unwrap_err(),
            ControlError::SensorRead { .. }
        ));
    }

    #[test]
    fn garbage_attribute_is_a_sensor_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = dir.path().join("in_temp_input");
        let h = dir.path().join("in_humidityrelative_input");
        fs::write(&t, "not-a-number\n").unwrap();
        fs::write(&h, "43200\n").unwrap();

        let mut sensor = IioSensor::with_paths(&t, &h);
        assert!(matches!(
            sensor.read().unwrap_err(),
            ControlError::SensorRead { .. }
        ));
    }
}
