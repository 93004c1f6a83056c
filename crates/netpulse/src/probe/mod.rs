/// Probe execution - one timed HTTP request per heartbeat
///
/// This module is responsible for:
/// - Issuing the configured request against the target
/// - Timing it under a hard timeout
/// - Deriving latency and bandwidth, or classifying the failure
pub mod executor;
pub mod prober;

pub use executor::{Measurement, ProbeExecutor, bandwidth_kbs};
pub use prober::{HttpProber, ProbeResponse, Prober};
