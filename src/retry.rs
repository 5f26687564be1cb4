use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{ExponentialBackoff, FixedInterval};
use tracing::trace;

/// Delays between verification attempts: the first retry waits `base`,
/// each later one doubles the previous wait.
pub fn verification_delays(base: Duration, attempts: u32) -> Vec<Duration> {
    // from_millis(2) doubles per step; halving the factor anchors the
    // first delay at the base itself
    ExponentialBackoff::from_millis(2)
        .factor(base.as_millis() as u64 / 2)
        .take(attempts.saturating_sub(1) as usize)
        .collect()
}

/// Poll `op` at a fixed interval until it yields `Some`, for at most
/// `max_attempts` tries. Returns `None` when the budget is exhausted; no
/// unbounded polling loops anywhere.
pub async fn poll_until<T, F, Fut>(
    max_attempts: u32,
    interval: Duration,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut delays = FixedInterval::new(interval).take(max_attempts.saturating_sub(1) as usize);

    for attempt in 1..=max_attempts.max(1) {
        if let Some(value) = op().await {
            return Some(value);
        }
        trace!(attempt, max_attempts, "poll attempt yielded nothing");
        match delays.next() {
            Some(delay) => tokio::time::sleep(delay).await,
            None => break,
        }
    }

    None
}
