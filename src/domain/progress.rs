use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Remaining time for an in-flight payment. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub seconds_remaining: u64,
    pub percent_elapsed: u8,
}

impl ProgressSnapshot {
    pub fn compute(started_at: Instant, now: Instant, timeout: Duration) -> Self {
        let elapsed = now.saturating_duration_since(started_at);
        let remaining = timeout.saturating_sub(elapsed);

        let percent = if timeout.is_zero() {
            100
        } else {
            ((elapsed.as_millis() * 100) / timeout.as_millis()).min(100) as u8
        };

        // Round up so the countdown only shows 0 once the timeout has passed.
        let seconds_remaining = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);

        Self {
            seconds_remaining,
            percent_elapsed: percent,
        }
    }
}
