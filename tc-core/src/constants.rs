//! Constants and configuration values for thermactl
//!
//! Centralizes all magic numbers, paths, and configuration defaults.
//! This is the SINGLE SOURCE OF TRUTH for all configuration values.
//! Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// Regulation defaults used when the state store has no persisted value
pub mod defaults {
    /// Default target temperature in °F
    pub const SETPOINT_F: f64 = 70.0;

    /// Default proportional gain
    pub const KP: f64 = 0.5;

    /// Default integral gain
    pub const KI: f64 = 0.1;

    /// Default derivative gain
    pub const KD: f64 = 0.01;
}

/// Timing parameters for the control loop and sensor pipeline
pub mod timing {
    use super::Duration;

    /// Control loop tick period
    pub const TICK_PERIOD: Duration = Duration::from_secs(5);

    /// Onboard sensor sampling period
    pub const SAMPLE_PERIOD: Duration = Duration::from_secs(60);

    /// Maximum age of a reading before it is pruned from its series
    pub const RETENTION_WINDOW: Duration = Duration::from_secs(60 * 60);

    /// Window over which the control aggregate is computed.
    /// Deliberately much shorter than the retention window.
    pub const AGGREGATION_WINDOW: Duration = Duration::from_secs(60);

    /// Status reports flag staleness once the last successful tick is older
    /// than this many tick periods.
    pub const STALE_AFTER_TICKS: u32 = 2;
}

/// PID regulator output range.
///
/// Signed output: negative means the measurement is below setpoint (heat
/// call), positive means above setpoint (cool call). Magnitude is compared
/// against the policy deadband.
pub mod pid {
    pub const OUTPUT_MIN: f64 = -10.0;
    pub const OUTPUT_MAX: f64 = 10.0;
}

/// Relay policy defaults
pub mod policy {
    /// Signal magnitude below which no actuation occurs (relay chatter guard)
    pub const DEFAULT_DEADBAND: f64 = 1.0;

    /// Months (1-12) in which heat calls are locked out
    pub const DEFAULT_SUMMER_MONTHS: [u32; 3] = [6, 7, 8];

    /// Months (1-12) in which cool calls are locked out
    pub const DEFAULT_WINTER_MONTHS: [u32; 3] = [12, 1, 2];
}

/// Relay GPIO value files (BCM 17/27/22 exported via sysfs)
pub mod gpio {
    pub const HEATING_VALUE: &str = "/sys/class/gpio/gpio17/value";
    pub const COOLING_VALUE: &str = "/sys/class/gpio/gpio27/value";
    pub const FAN_VALUE: &str = "/sys/class/gpio/gpio22/value";
}

/// Onboard temperature/humidity sensor (IIO sysfs attributes)
pub mod sensor {
    /// Series name the onboard sampler ingests under
    pub const INTERNAL_SENSOR_ID: &str = "internal_sensor";

    /// Temperature attribute, millidegrees Celsius
    pub const TEMP_INPUT: &str = "/sys/bus/iio/devices/iio:device0/in_temp_input";

    /// Relative humidity attribute, millipercent
    pub const HUMIDITY_INPUT: &str =
        "/sys/bus/iio/devices/iio:device0/in_humidityrelative_input";
}

/// System paths
pub mod paths {
    use std::path::PathBuf;

    /// Default directory for persisted control state
    pub const STATE_DIR: &str = "/var/lib/thermactl";

    /// Persisted control state file name
    pub const STATE_FILE: &str = "state.json";

    /// Resolve the state file path, honoring THERMACTL_STATE_DIR for
    /// development and tests.
    pub fn state_file_path() -> PathBuf {
        let dir = std::env::var("THERMACTL_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(STATE_DIR));
        dir.join(STATE_FILE)
    }
}

/// Validation limits for request-handler input
pub mod limits {
    /// Setpoints outside this range are rejected as operator error
    pub const SETPOINT_MIN_F: f64 = 40.0;
    pub const SETPOINT_MAX_F: f64 = 95.0;

    /// Readings outside this range are treated as sensor garbage
    pub const READING_MIN_F: f64 = -40.0;
    pub const READING_MAX_F: f64 = 150.0;

    /// Maximum sensor name length
    pub const MAX_SENSOR_NAME_LEN: usize = 64;

    /// Consecutive control-loop failures before escalating the log level
    pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

    /// Cap on readings reported per sensor in a status snapshot
    pub const STATUS_READINGS_PER_SENSOR: usize = 12;
}
