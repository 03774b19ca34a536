//! Synthetic wind gusts
//!
//! The ResponseOne reports only instantaneous wind. Gusts are
//! estimated here as the peak instantaneous speed over a
//! trailing time window. The estimate is only as good as the
//! frame rate: with an output interval of one second and a
//! three second window, a gust is the maximum of about three
//! samples.
//!
//! A sample received at time `t` belongs to the window at time
//! `T` if `T - window < t <= T`.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::timeddata::TimedData;

/// Longest permitted gust window
pub const MAX_GUST_WINDOW: Duration = Duration::from_secs(86400);

/// One instantaneous wind measurement
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GustSample {
    /// Wind speed (m/s)
    pub speed_mps: f64,

    /// Wind direction (degrees)
    pub direction_deg: f64,
}

/// Estimated wind gust
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gust {
    /// Peak wind speed within the window (m/s)
    pub speed_mps: f64,

    /// Wind direction of the peak sample (degrees)
    pub direction_deg: f64,

    /// When the peak sample was received
    pub received: Instant,

    /// Number of samples within the window
    pub samples: usize,

    /// Too few samples for a trustworthy estimate
    ///
    /// Set when fewer than the configured minimum number
    /// of samples fall within the window, which happens at
    /// startup or if the frame rate drops. The gust is still
    /// the true maximum of the samples available.
    pub low_density: bool,
}

/// Gust estimator
///
/// Retains all wind samples received within the trailing
/// window. Samples must be inserted in time order.
///
/// Both eviction and the maximum are amortized O(1): a second
/// queue holds only samples which could still become the
/// peak, in order of decreasing speed.
#[derive(Clone, Debug)]
pub struct GustEstimator {
    // expiration time of every sample in the window
    deadlines: VecDeque<Instant>,

    // candidate peaks, non-increasing speed from front to back
    peaks: VecDeque<TimedData<GustSample>>,

    // window duration
    window: Duration,

    // fewer samples than this are flagged low-density
    min_samples: usize,

    // most recent insertion time
    latest: Option<Instant>,
}

impl GustEstimator {
    /// New estimator with the given trailing `window`
    ///
    /// Windows longer than [`MAX_GUST_WINDOW`] are shortened
    /// to it.
    pub fn new(window: Duration, min_samples: usize) -> Self {
        Self {
            deadlines: VecDeque::new(),
            peaks: VecDeque::new(),
            window: Duration::min(window, MAX_GUST_WINDOW),
            min_samples,
            latest: None,
        }
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.deadlines.clear();
        self.peaks.clear();
        self.latest = None;
    }

    /// Window duration
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Add a wind sample received at time `now`
    ///
    /// Samples older than the most recent one are treated
    /// as if they had arrived with it.
    pub fn insert(&mut self, sample: GustSample, now: Instant) {
        let now = match self.latest {
            Some(latest) if latest > now => latest,
            _ => now,
        };
        self.latest = Some(now);
        self.evict(now);

        // a newer sample at least as fast always wins,
        // so older slower samples can never be the peak
        while let Some(back) = self.peaks.back() {
            if back.data.speed_mps <= sample.speed_mps {
                self.peaks.pop_back();
            } else {
                break;
            }
        }

        let entry = TimedData::with_lifetime(sample, now, self.window);
        self.deadlines.push_back(entry.deadline);
        self.peaks.push_back(entry);
    }

    /// Gust as of time `now`
    ///
    /// Discards samples which have left the window, then
    /// reports the peak of the rest. Returns `None` if the
    /// window is empty. A calm wind has a gust of zero; an
    /// empty window has no gust at all.
    pub fn gust_at(&mut self, now: Instant) -> Option<Gust> {
        self.evict(now);
        let peak = self.peaks.front()?;
        let samples = self.deadlines.len();
        Some(Gust {
            speed_mps: peak.data.speed_mps,
            direction_deg: peak.data.direction_deg,
            received: peak.received,
            samples,
            low_density: samples < self.min_samples,
        })
    }

    /// Number of samples retained
    ///
    /// This count may include expired samples until the next
    /// call to [`gust_at()`](#method.gust_at) or
    /// [`insert()`](#method.insert).
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// True if no samples are retained
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    // drop samples which are expired at `now`
    fn evict(&mut self, now: Instant) {
        while self.deadlines.front().map_or(false, |dl| *dl <= now) {
            self.deadlines.pop_front();
        }
        while self.peaks.front().map_or(false, |pk| pk.is_expired_at(now)) {
            self.peaks.pop_front();
        }
    }
}

/// Latest gust, shared with other threads
///
/// The gust window belongs to the receiver's thread. Other
/// threads which want the most recent gust estimate may hold a
/// `GustWatch`, which the receiver updates with every
/// observation it emits. Clones are cheap and all observe the
/// same value.
#[derive(Clone, Debug, Default)]
pub struct GustWatch {
    latest: Arc<RwLock<Option<Gust>>>,
}

impl GustWatch {
    /// New watch with no gust
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published gust, if any
    pub fn latest(&self) -> Option<Gust> {
        match self.latest.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    // Publish a new gust estimate
    pub(crate) fn publish(&self, gust: Option<Gust>) {
        match self.latest.write() {
            Ok(mut guard) => *guard = gust,
            Err(poisoned) => *poisoned.into_inner() = gust,
        }
    }
}
