//! Exponential smoothing of noisy scalar signals.
//!
//! Every measurement the throttler consumes (cost telemetry, transaction
//! counts, its own published limits) is noisy. A [`Smoother`] tracks a raw
//! running total alongside an exponentially-decayed estimate of it; the
//! estimate chases the total with e-folding time `τ`, so a step change in the
//! input decays to within `1/e` of the new value after `τ` elapses.
//!
//! Two usage modes share the same state:
//!
//! - **Delta-accumulating**: feed increments with [`Smoother::add_delta`] and
//!   read the arrival rate with [`Smoother::smoothed_rate`].
//! - **Total-replacing**: overwrite the total with [`Smoother::set_total`] and
//!   read the stabilized value with [`Smoother::smoothed_total`].
//!
//! All operations take the current time explicitly (`now_us`), so behavior is
//! fully deterministic under simulated time. Time must be monotone; stale
//! timestamps are treated as "no time has passed".

/// Microseconds per second, for converting explicit timestamps to the f64
/// seconds the decay math runs in.
const MICROS_PER_SEC: f64 = 1_000_000.0;

/// An exponentially-weighted estimator of a scalar total.
///
/// Not thread-safe; the owner serializes access.
#[derive(Debug, Clone)]
pub struct Smoother {
    /// E-folding time in microseconds.
    folding_time_us: u64,

    /// Time of the last committed update.
    time_us: u64,

    /// The raw running total.
    total: f64,

    /// Decayed estimate of the total as of `time_us`.
    estimate: f64,
}

impl Smoother {
    /// Creates a smoother at zero. `now_us` is the time origin.
    ///
    /// # Panics
    /// Panics if `folding_time_us` is zero.
    #[must_use]
    pub fn new(folding_time_us: u64, now_us: u64) -> Self {
        assert!(folding_time_us > 0, "folding time must be positive");
        Self {
            folding_time_us,
            time_us: now_us,
            total: 0.0,
            estimate: 0.0,
        }
    }

    /// Resets both the total and the estimate to `value` at `now_us`.
    pub fn reset(&mut self, value: f64, now_us: u64) {
        self.time_us = now_us;
        self.total = value;
        self.estimate = value;
    }

    /// Adds `delta` to the underlying total at `now_us`.
    pub fn add_delta(&mut self, delta: f64, now_us: u64) {
        self.commit(now_us);
        self.total += delta;
    }

    /// Replaces the underlying total with `total` at `now_us`.
    pub fn set_total(&mut self, total: f64, now_us: u64) {
        self.add_delta(total - self.total, now_us);
    }

    /// Returns the raw (unsmoothed) total.
    #[must_use]
    pub const fn total(&self) -> f64 {
        self.total
    }

    /// Returns the exponentially-weighted estimate of the total at `now_us`.
    #[must_use]
    pub fn smoothed_total(&self, now_us: u64) -> f64 {
        self.projected_estimate(now_us)
    }

    /// Returns the exponentially-weighted rate at which deltas have been
    /// arriving, at `now_us`.
    ///
    /// This is the time derivative of [`Smoother::smoothed_total`]:
    /// `(total − estimate) / τ`.
    #[must_use]
    pub fn smoothed_rate(&self, now_us: u64) -> f64 {
        (self.total - self.projected_estimate(now_us)) / self.folding_secs()
    }

    /// Commits the decay up to `now_us` into the stored estimate.
    ///
    /// Mutators call this first so the decay between mutations is applied
    /// against the total that was in effect during that interval.
    fn commit(&mut self, now_us: u64) {
        self.estimate = self.projected_estimate(now_us);
        self.time_us = self.time_us.max(now_us);
    }

    /// Pure projection of the estimate forward to `now_us`.
    ///
    /// With a constant total, decaying from the last commit point directly to
    /// `now_us` equals decaying through any intermediate times, so reads do
    /// not need to write back.
    fn projected_estimate(&self, now_us: u64) -> f64 {
        let elapsed_us = now_us.saturating_sub(self.time_us);
        if elapsed_us == 0 {
            return self.estimate;
        }
        #[allow(clippy::cast_precision_loss)] // Elapsed micros are far below 2^52.
        let elapsed_secs = elapsed_us as f64 / MICROS_PER_SEC;
        let decay = 1.0 - (-elapsed_secs / self.folding_secs()).exp();
        self.estimate + (self.total - self.estimate) * decay
    }

    fn folding_secs(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)] // Folding times are seconds-scale.
        let secs = self.folding_time_us as f64 / MICROS_PER_SEC;
        secs
    }
}
