use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Polls `probe` until it yields a value or `deadline` has elapsed.
///
/// The probe always runs at least once, and once more right at the deadline,
/// so a zero deadline still checks the current state.
pub async fn poll_until<T, F, Fut>(deadline: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return None;
        }
        sleep(interval.min(deadline - elapsed)).await;
    }
}
