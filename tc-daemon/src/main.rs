//! Thermal Regulation Daemon (thermactld)
//!
//! A **hardened** service for residential HVAC relay control.
//! Regulates temperature against a setpoint via a PID-driven relay policy.
//!
//! # Safety Model
//! - **Fail-safe**: all relays forced off at startup, on every failed tick,
//!   and unconditionally on shutdown
//! - **No-data guard**: relays stay off until sensor readings exist
//! - **Mutual exclusion**: heating and cooling are never energized together
//! - **Seasonal lockout**: heat calls suppressed in summer months,
//!   cool calls in winter months
//! - **Persistence**: settings survive restarts via an atomic JSON state file

mod control_loop;
mod sampler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use tc_core::constants::{paths, timing};
use tc_core::data::persistence::JsonFileStore;
use tc_core::hw::actuator::{RelayActuator, SysfsGpioRelays};
use tc_core::hw::sensor::IioSensor;
use tc_core::sensors::SensorStore;
use tc_core::state::ControlState;
use tc_core::{RelayPolicy, Thermostat};

use control_loop::ControlLoop;
use sampler::Sampler;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("thermactld {} - Thermal regulation daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    thermactld [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -s, --state PATH    State file path (default: {})", paths::STATE_DIR);
    eprintln!("    -t, --tick SECONDS  Control tick period (default: {}s)", timing::TICK_PERIOD.as_secs());
    eprintln!("    -p, --policy PATH   Relay policy JSON (deadband, lockout months)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    THERMACTL_LOG        Log level (trace, debug, info, warn, error)");
    eprintln!("    THERMACTL_STATE_DIR  Overrides the state directory");
}

fn print_version() {
    println!("thermactld {}", VERSION);
}

struct Options {
    state_path: std::path::PathBuf,
    tick_period: Duration,
    policy_path: Option<std::path::PathBuf>,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options {
        state_path: paths::state_file_path(),
        tick_period: timing::TICK_PERIOD,
        policy_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-s" | "--state" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --state requires a path argument");
                    std::process::exit(1);
                }
                opts.state_path = args[i].clone().into();
            }
            "-p" | "--policy" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --policy requires a path argument");
                    std::process::exit(1);
                }
                opts.policy_path = Some(args[i].clone().into());
            }
            "-t" | "--tick" => {
                i += 1;
                let secs = args.get(i).and_then(|a| a.parse::<u64>().ok());
                match secs {
                    Some(s) if s > 0 => opts.tick_period = Duration::from_secs(s),
                    _ => {
                        eprintln!("Error: --tick requires a positive integer of seconds");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    opts
}

// ============================================================================
// Policy file
// ============================================================================

/// Deserialize and validate an operator-supplied relay policy. Fields
/// omitted from the file keep their defaults.
fn load_policy(path: &std::path::Path) -> tc_core::Result<RelayPolicy> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| tc_core::ControlError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    let policy: RelayPolicy = serde_json::from_str(&contents)?;
    policy.validate()?;
    Ok(policy)
}

// ============================================================================
// Logging
// ============================================================================

/// Journald when running under systemd, stdout otherwise. Returns whether
/// journald ended up in use.
fn init_logging(log_level: &str) -> bool {
    let journald_available = std::path::Path::new("/run/systemd/journal/socket").exists();

    if journald_available {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // PHASE 0: Global panic handler. A panic must be visible in the journal
    // even when the tracing stack is the thing that broke.
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
    }));

    // PHASE 1: Arguments and logging
    let opts = parse_args();
    let log_level = std::env::var("THERMACTL_LOG").unwrap_or_else(|_| "info".to_string());
    let use_journald = init_logging(&log_level);

    info!("STARTUP: thermactld {} starting", VERSION);
    info!(
        "STARTUP: Logging to {} at level {}",
        if use_journald { "systemd journal" } else { "stdout" },
        log_level
    );
    info!("STARTUP: State file: {}", opts.state_path.display());
    info!("STARTUP: Tick period: {:?}", opts.tick_period);

    let policy = match &opts.policy_path {
        Some(path) => {
            let policy = load_policy(path).map_err(|e| {
                error!("Invalid relay policy {}: {}", path.display(), e);
                e
            })?;
            info!(
                "STARTUP: Relay policy from {}: deadband {}, summer {:?}, winter {:?}",
                path.display(),
                policy.deadband,
                policy.summer_months,
                policy.winter_months
            );
            policy
        }
        None => RelayPolicy::default(),
    };

    // PHASE 2: State store and persisted settings
    if let Some(dir) = opts.state_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Could not create state directory {}: {}", dir.display(), e);
        }
    }
    let store = Arc::new(JsonFileStore::open(&opts.state_path)?);

    let state = Arc::new(ControlState::seed_from(&*store));
    debug!("Persisted settings restored");

    // PHASE 3: Relay bank, forced to a safe state before anything else runs
    let mut relays = SysfsGpioRelays::new();
    if let Err(e) = relays.all_off() {
        // Not fatal: GPIO exports may not exist yet on a fresh boot. The
        // control loop retries before its first decision.
        warn!("Startup relay reset failed: {}", e);
    }
    let actuator: Arc<Mutex<Box<dyn RelayActuator>>> =
        Arc::new(Mutex::new(Box::new(relays)));

    // PHASE 4: Shared core
    let sensors = Arc::new(Mutex::new(SensorStore::new()));
    let thermostat = Thermostat::new(
        Arc::clone(&state),
        Arc::clone(&sensors),
        Arc::clone(&actuator),
        store,
    )
    .with_tick_period(opts.tick_period);

    // PHASE 5: Signal handlers
    let shutdown = Arc::new(AtomicBool::new(false));
    let wakeup = Arc::new(Notify::new());

    {
        let shutdown = Arc::clone(&shutdown);
        let wakeup = Arc::clone(&wakeup);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
            shutdown.store(true, Ordering::SeqCst);
            wakeup.notify_waiters();
        }) {
            warn!(
                "Failed to set signal handler: {}. Shutdown via signals may not work cleanly.",
                e
            );
        }
    }

    // PHASE 6: Onboard sensor sampler, started only when the hardware exists.
    // Without it the daemon still regulates on remote readings.
    let onboard = IioSensor::new();
    let sampler_handle = if onboard.is_present() {
        let sampler = Sampler::new(thermostat.clone(), Box::new(onboard));
        let shutdown = Arc::clone(&shutdown);
        let wakeup = Arc::clone(&wakeup);
        Some(tokio::spawn(async move {
            sampler.run(shutdown, wakeup).await;
        }))
    } else {
        info!("Onboard IIO sensor not present, relying on remote readings");
        None
    };

    // PHASE 7: Control loop, foreground task
    let control = ControlLoop::new(&thermostat).with_policy(policy);
    control
        .run(Arc::clone(&shutdown), Arc::clone(&wakeup))
        .await;

    // PHASE 8: Drain the sampler and force a final safe state
    if let Some(handle) = sampler_handle {
        if let Err(e) = handle.await {
            error!("Sampler task failed: {}", e);
        }
    }

    if let Err(e) = thermostat.actuator().lock().all_off() {
        error!("SHUTDOWN: final relay reset failed: {}", e);
    }

    info!("SHUTDOWN: thermactld terminated gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_file_overrides_deadband_and_months() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{"deadband": 2.0, "summer_months": [12, 1, 2], "winter_months": [6, 7, 8]}"#,
        )
        .unwrap();

        let policy = load_policy(&path).unwrap();
        assert_eq!(policy.deadband, 2.0);
        assert!(policy.summer_months.contains(&1));
        assert!(policy.winter_months.contains(&7));
    }

    #[test]
    fn partial_policy_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"deadband": 0.5}"#).unwrap();

        let policy = load_policy(&path).unwrap();
        assert_eq!(policy.deadband, 0.5);
        assert_eq!(policy.summer_months, RelayPolicy::default().summer_months);
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");

        std::fs::write(&path, r#"{"deadband": -1.0}"#).unwrap();
        assert!(load_policy(&path).is_err());

        std::fs::write(&path, r#"{"winter_months": [13]}"#).unwrap();
        assert!(load_policy(&path).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(load_policy(&path).is_err());

        assert!(load_policy(&dir.path().join("missing.json")).is_err());
    }
}
