//! Bounded draining of a result channel

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

/// Receive up to `target` items from `rx`.
///
/// Stops early when the channel closes or when no item arrives within
/// `idle_timeout` of the previous one.
pub async fn collect<T>(rx: &mut mpsc::Receiver<T>, target: usize, idle_timeout: Duration) -> Vec<T> {
    let mut collected = Vec::with_capacity(target);

    while collected.len() < target {
        match timeout(idle_timeout, rx.recv()).await {
            Ok(Some(item)) => collected.push(item),
            Ok(None) => {
                warn!(
                    "Result channel closed after {} of {} results",
                    collected.len(),
                    target
                );
                break;
            }
            Err(_) => {
                info!(
                    "No results for {:?}, stopping after {} of {}",
                    idle_timeout,
                    collected.len(),
                    target
                );
                break;
            }
        }
    }

    collected
}
