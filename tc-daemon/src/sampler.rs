//! Onboard sensor sampling task.
//!
//! Polls the local IIO temperature/humidity sensor on a fixed period and
//! feeds readings into the shared store under the internal series name.
//! Remote sensors arrive through the service surface instead; this task
//! only covers the sensor wired to the controller itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use tc_core::constants::sensor;
use tc_core::hw::sensor::{SensorReader, fahrenheit_from_celsius};
use tc_core::Thermostat;

pub struct Sampler {
    thermostat: Thermostat,
    reader: Arc<Mutex<Box<dyn SensorReader>>>,
    period: Duration,
}

impl Sampler {
    pub fn new(thermostat: Thermostat, reader: Box<dyn SensorReader>) -> Self {
        Self {
            thermostat,
            reader: Arc::new(Mutex::new(reader)),
            period: tc_core::constants::timing::SAMPLE_PERIOD,
        }
    }

    #[cfg(test)]
    fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Read once and ingest. A failed read is logged and skipped; the
    /// control loop's windowed expiry handles the resulting gap.
    pub async fn sample_once(&self) {
        let reader = Arc::clone(&self.reader);
        let read = tokio::task::spawn_blocking(move || reader.lock().read()).await;

        let (celsius, humidity) = match read {
            Ok(Ok(values)) => values,
            Ok(Err(e)) => {
                warn!(error = %e, "Onboard sensor read failed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Sensor read task panicked");
                return;
            }
        };

        let fahrenheit = fahrenheit_from_celsius(celsius);
        match self
            .thermostat
            .submit_reading(sensor::INTERNAL_SENSOR_ID, fahrenheit, humidity, None)
        {
            Ok(()) => {
                debug!(fahrenheit, humidity, "Onboard reading ingested");
            }
            Err(e) => warn!(fahrenheit, humidity, error = %e, "Onboard reading rejected"),
        }
    }

    pub async fn run(self, shutdown: Arc<AtomicBool>, wakeup: Arc<Notify>) {
        info!(period = ?self.period, "Sensor sampler starting");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            self.sample_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = wakeup.notified() => {}
            }
        }

        info!("Sensor sampler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_core::data::persistence::JsonFileStore;
    use tc_core::hw::actuator::RelayActuator;
    use tc_core::sensors::SensorStore;
    use tc_core::state::ControlState;
    use tc_core::{ControlError, Result};

    struct FixedReader {
        celsius: f64,
        humidity: f64,
        fail: bool,
    }

    impl SensorReader for FixedReader {
        fn read(&mut self) -> Result<(f64, f64)> {
            if self.fail {
                return Err(ControlError::sensor_read("internal_sensor", "injected"));
            }
            Ok((self.celsius, self.humidity))
        }
    }

    struct NullRelays;

    impl RelayActuator for NullRelays {
        fn set_heating(&mut self, _on: bool) -> Result<()> {
            Ok(())
        }
        fn set_cooling(&mut self, _on: bool) -> Result<()> {
            Ok(())
        }
        fn set_fan(&mut self, _on: bool) -> Result<()> {
            Ok(())
        }
    }

    fn thermostat() -> (Thermostat, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path().join("state.json")).unwrap());
        let t = Thermostat::new(
            Arc::new(ControlState::new()),
            Arc::new(Mutex::new(SensorStore::new())),
            Arc::new(Mutex::new(Box::new(NullRelays) as Box<dyn RelayActuator>)),
            store,
        );
        (t, dir)
    }

    #[tokio::test]
    async fn successful_sample_lands_in_the_internal_series() {
        let (t, _dir) = thermostat();
        let sampler = Sampler::new(
            t.clone(),
            Box::new(FixedReader {
                celsius: 20.0,
                humidity: 45.0,
                fail: false,
            }),
        )
        .with_period(Duration::from_millis(5));

        sampler.sample_once().await;

        let sensors = t.sensors();
        let sensors = sensors.lock();
        assert_eq!(sensors.series_len(sensor::INTERNAL_SENSOR_ID), 1);
        let recent = sensors.recent();
        let sample = recent[sensor::INTERNAL_SENSOR_ID].last().unwrap();
        assert_eq!(sample.temperature_f, 68.0);
        assert_eq!(sample.humidity, 45.0);
    }

    #[tokio::test]
    async fn failed_read_leaves_the_store_untouched() {
        let (t, _dir) = thermostat();
        let sampler = Sampler::new(
            t.clone(),
            Box::new(FixedReader {
                celsius: 0.0,
                humidity: 0.0,
                fail: true,
            }),
        );

        sampler.sample_once().await;

        assert!(!t.sensors().lock().has_readings(sensor::INTERNAL_SENSOR_ID));
    }

    #[tokio::test]
    async fn out_of_range_reading_is_rejected_not_stored() {
        let (t, _dir) = thermostat();
        // 80 C is 176 F, past the plausible-reading ceiling
        let sampler = Sampler::new(
            t.clone(),
            Box::new(FixedReader {
                celsius: 80.0,
                humidity: 45.0,
                fail: false,
            }),
        );

        sampler.sample_once().await;

        assert!(!t.sensors().lock().has_readings(sensor::INTERNAL_SENSOR_ID));
    }
}
