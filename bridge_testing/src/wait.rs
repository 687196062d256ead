//! Polling helpers for conditions that become true asynchronously.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics if it still does not hold after `within`.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + within;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {within:?}");
        sleep(POLL_INTERVAL).await;
    }
}

/// Like [`eventually`], for conditions that must be awaited.
///
/// # Panics
///
/// Panics if it still does not hold after `within`.
pub async fn eventually_async<F, Fut>(within: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + within;
    while !condition().await {
        assert!(Instant::now() < deadline, "condition not met within {within:?}");
        sleep(POLL_INTERVAL).await;
    }
}
