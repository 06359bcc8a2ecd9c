//! PID regulator for temperature error
//!
//! A single stateful instance lives for the whole process; it is never
//! re-created per tick. Gains and setpoint are passed in fresh on every
//! update, so live tuning takes effect on the next tick without disturbing
//! the accumulated integral.
//!
//! # Sign convention
//!
//! Error is `measured - setpoint`: output is positive when the room is above
//! setpoint (cool call) and negative when below (heat call). The relay
//! policy uses the sign as the heat/cool discriminator and the magnitude as
//! its deadband test.
//!
//! # Windup protection
//!
//! The integral is clamped so its contribution alone stays within the output
//! bounds, and accumulation is rolled back while the output is saturated in
//! the error's direction. Both guards are independent of the timestep.

use std::time::Instant;

use crate::constants::pid as pid_const;
use crate::data::types::PidGains;

/// Stateful proportional-integral-derivative regulator
#[derive(Debug, Clone)]
pub struct PidRegulator {
    min_output: f64,
    max_output: f64,
    integral: f64,
    last_error: Option<f64>,
    last_update: Option<Instant>,
}

impl PidRegulator {
    pub fn new() -> Self {
        Self::with_output_range(pid_const::OUTPUT_MIN, pid_const::OUTPUT_MAX)
    }

    pub fn with_output_range(min_output: f64, max_output: f64) -> Self {
        debug_assert!(min_output < max_output);
        Self {
            min_output,
            max_output,
            integral: 0.0,
            last_error: None,
            last_update: None,
        }
    }

    /// Compute the control signal for one tick.
    ///
    /// `now` is the wall-clock instant of this tick; the derivative and
    /// integral terms use the real elapsed time since the previous update,
    /// never an assumed fixed period. Callers must not invoke this on a
    /// "no data" tick - skipping a tick intentionally freezes the integral.
    pub fn update(&mut self, gains: PidGains, setpoint: f64, measured: f64, now: Instant) -> f64 {
        let error = measured - setpoint;
        let dt = match self.last_update {
            Some(prev) => now.saturating_duration_since(prev).as_secs_f64(),
            None => 0.0,
        };

        let p_term = gains.kp * error;

        let previous_integral = self.integral;
        if dt > 0.0 {
            self.integral += error * dt;
        }
        // Keep the integral contribution alone inside the output range.
        if gains.ki > 0.0 {
            let bound = self.max_output.abs().max(self.min_output.abs()) / gains.ki;
            self.integral = self.integral.clamp(-bound, bound);
        }
        let i_term = gains.ki * self.integral;

        let d_term = match self.last_error {
            Some(prev) if dt > 0.0 => gains.kd * (error - prev) / dt,
            _ => 0.0,
        };

        let raw = p_term + i_term + d_term;
        let output = raw.clamp(self.min_output, self.max_output);

        // Saturated in the direction the error is pushing: drop this tick's
        // accumulation so the integral cannot wind up.
        if output != raw && (raw - output).signum() == error.signum() {
            self.integral = previous_integral;
        }

        self.last_error = Some(error);
        self.last_update = Some(now);
        output
    }

    /// Accumulated integral term (exposed for regression tests)
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Discard history. Only used when the operator re-targets the system
    /// wholesale, never on routine gain changes.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
        self.last_update = None;
    }
}

impl Default for PidRegulator {
    fn default() -> Self {
        Self::new()
    }
}
