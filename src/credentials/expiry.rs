//! Token refresh timing
//!
//! A cached token is reused until its refresh deadline: a safety margin
//! before the `exp` claim, or a fixed lifetime when the token carries none.
//! Time is read through [`Clock`] so the deadline can be crossed in tests
//! without sleeping.

use chrono::{DateTime, Duration, Utc};

/// Refresh this many seconds before the `exp` claim
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Cache lifetime when the token carries no readable `exp` claim
pub const FALLBACK_LIFETIME_SECS: i64 = 55 * 60;

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Whether a token whose refresh deadline is `at` must be fetched again
    fn refresh_due(&self, at: DateTime<Utc>) -> bool {
        self.now() >= at
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// When a token fetched at `fetched_at` should be replaced
pub fn refresh_deadline(
    expires_at: Option<DateTime<Utc>>,
    fetched_at: DateTime<Utc>,
) -> DateTime<Utc> {
    match expires_at {
        Some(exp) => exp - Duration::seconds(EXPIRY_MARGIN_SECS),
        None => fetched_at + Duration::seconds(FALLBACK_LIFETIME_SECS),
    }
}

/// Clock that only moves when told to
#[cfg(test)]
pub struct MockClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl MockClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += duration;
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
