//! Benchmark harness: fixed-rate admission, result collection and CSV reports
pub mod admission;
pub mod collector;
pub mod config;
pub mod error;
pub mod report;

pub use admission::{run_per_second, run_per_second_sync};
pub use collector::collect;
pub use config::EvalConfig;
pub use error::{EvalError, Result};
pub use report::{subtract, write_csv, EvalResult};
