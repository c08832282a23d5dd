use chrono::{DateTime, Utc};
use std::time::Duration;

const BASE_DELAY_SECS: u64 = 5 * 60;
const GROWTH_FACTOR: u64 = 3;
const MAX_DELAY_SECS: u64 = 24 * 60 * 60;

/// Delay before a source with `error_count` consecutive failures is retried:
/// `min(5 * 3^(n-1) minutes, 24 hours)`. No jitter, so a source's retry time
/// is predictable from its error count alone.
pub fn retry_delay(error_count: i32) -> Duration {
    let attempt = error_count.max(1) as u32;

    // 5min * 3^6 already exceeds the cap; bound the exponent so the power cannot overflow
    let capped_exponent = (attempt - 1).min(10);

    let delay = BASE_DELAY_SECS.saturating_mul(GROWTH_FACTOR.saturating_pow(capped_exponent));
    Duration::from_secs(delay.min(MAX_DELAY_SECS))
}

pub fn next_retry_at(error_count: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(retry_delay(error_count))
        .unwrap_or_else(|_| chrono::Duration::seconds(MAX_DELAY_SECS as i64));
    now + delay
}
