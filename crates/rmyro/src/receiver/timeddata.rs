use std::time::{Duration, Instant};

/// Time-sensitive data with an expiration time
#[derive(Clone, Debug, PartialEq)]
pub struct TimedData<D> {
    /// Data
    pub data: D,

    /// Time the data was received, from a monotonic clock
    pub received: Instant,

    /// Deadline or expiration time
    pub deadline: Instant,
}

impl<D> TimedData<D> {
    /// Store `data`, received at `received`, for the given `lifetime`
    pub fn with_lifetime(data: D, received: Instant, lifetime: Duration) -> Self {
        TimedData {
            data,
            received,
            deadline: received + lifetime,
        }
    }

    /// Check for expiration
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

impl<D> AsRef<D> for TimedData<D> {
    fn as_ref(&self) -> &D {
        &self.data
    }
}
