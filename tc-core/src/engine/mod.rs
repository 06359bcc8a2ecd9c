//! Control computation
//!
//! - `pid` - Stateful PID regulator producing a bounded signed signal
//! - `relay` - Pure decision function mapping signal + flags to actuation

pub mod pid;
pub mod relay;

pub use pid::PidRegulator;
pub use relay::{PolicyFlags, RelayPolicy, decide};
