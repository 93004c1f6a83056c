//! Shared `tracing` setup for netpulse binaries.

mod subscriber;

pub use subscriber::{LogFormat, init, init_with};
