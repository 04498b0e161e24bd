use std::time::Duration;
use tokio::sync::watch;

/// Doubling stops here; the delay is capped by `max` long before.
const MAX_EXPONENT: u32 = 16;

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before retry number `attempt` (0-based): `initial * 2^attempt`, capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.pow(attempt.min(MAX_EXPONENT));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Sleep for `delay` unless shutdown is signalled first.
///
/// Returns `false` if the sleep was cut short by shutdown.
pub async fn sleep_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        biased;

        changed = shutdown_rx.changed() => {
            // A dropped sender counts as shutdown.
            changed.is_ok() && !*shutdown_rx.borrow()
        }

        _ = tokio::time::sleep(delay) => true,
    }
}
