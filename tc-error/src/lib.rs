//! Unified error handling for thermactl
//!
//! This crate provides a single error type used across all thermactl
//! components. It uses thiserror for ergonomic error definitions with proper
//! Display and Error trait impls.
//!
//! Note that "no sensor data" is *not* an error anywhere in the system: an
//! empty aggregation window is a legitimate control outcome and is modeled
//! as `Option::None` / `RelayDecision::NoData` in tc-core.

use std::io;
use std::path::PathBuf;

/// Result type alias using ControlError
pub type Result<T> = std::result::Result<T, ControlError>;

/// Unified error type for all thermactl operations
#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    // ============================================================================
    // Input Validation Errors (rejected before reaching the core)
    // ============================================================================
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: String,
    },

    #[error("Invalid temperature: {value}°F")]
    InvalidTemperature {
        value: f64,
    },

    #[error("Invalid humidity: {value}% (must be 0-100)")]
    InvalidHumidity {
        value: f64,
    },

    #[error("Invalid sensor name: {0:?}")]
    InvalidSensorName(String),

    #[error("Cannot select sensor {0:?}: no readings recorded for it")]
    InvalidModeSelection(String),

    // ============================================================================
    // Collaborator Errors (contained to a single tick by the control loop)
    // ============================================================================
    #[error("Failed to read sensor {source_id}: {reason}")]
    SensorRead {
        source_id: String,
        reason: String,
    },

    #[error("Failed to write relay {relay}: {reason}")]
    ActuatorWrite {
        relay: &'static str,
        reason: String,
    },

    #[error("State store failure for key {key:?}: {reason}")]
    Persistence {
        key: String,
        reason: String,
    },

    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl ControlError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Create a sensor read error
    pub fn sensor_read(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SensorRead {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must be contained to the current tick rather than
    /// surfaced to a request handler.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::SensorRead { .. } | Self::ActuatorWrite { .. } | Self::Persistence { .. }
        )
    }
}

// Allow converting from String to ControlError
impl From<String> for ControlError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to ControlError
impl From<&str> for ControlError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
