use std::time::Duration;

/// Benchmark run configuration
#[derive(Clone, Debug)]
pub struct EvalConfig {
    /// Number of operations to admit
    pub runs: usize,
    /// Admission rate
    pub runs_per_second: u32,
    /// Longest wait for the next result before a collector gives up
    pub idle_timeout: Duration,
    /// Capacity of result channels
    pub channel_capacity: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            runs: 1,
            runs_per_second: 1,
            idle_timeout: Duration::from_secs(30),
            channel_capacity: 1000,
        }
    }
}
