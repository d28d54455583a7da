//! Fixed-rate admission of benchmark operations

use crate::{EvalError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

fn tick_period(runs_per_second: u32) -> Result<Duration> {
    if runs_per_second == 0 {
        return Err(EvalError::InvalidRate(runs_per_second));
    }
    Ok(Duration::from_secs(1) / runs_per_second)
}

/// Start `task(run)` for each run in `0..runs`, one per tick at
/// `runs_per_second`, and wait for all of them to finish.
///
/// Admission never waits on earlier runs; results are reported by the tasks
/// themselves.
pub async fn run_per_second<F, Fut>(runs: usize, runs_per_second: u32, task: F) -> Result<()>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut ticker = interval(tick_period(runs_per_second)?);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let mut tasks = JoinSet::new();
    for run in 0..runs {
        ticker.tick().await;
        tasks.spawn(task(run));
    }
    debug!("Admitted {} runs at {} per second", runs, runs_per_second);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Benchmark run did not complete: {}", e);
        }
    }
    Ok(())
}

/// Run `task(run)` for each run in `0..runs` on a fixed tick, one at a time
pub async fn run_per_second_sync<F, Fut>(runs: usize, runs_per_second: u32, mut task: F) -> Result<()>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(tick_period(runs_per_second)?);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for run in 0..runs {
        ticker.tick().await;
        task(run).await;
    }
    Ok(())
}
