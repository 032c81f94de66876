//! Per-tag control state, aggregated across all storage servers.

use weir_core::Quota;

use crate::smoother::Smoother;

/// A TPS limit published to clients for one tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientTagLimit {
    /// Transactions per second each client may start.
    pub tps: f64,
    /// Expiration timestamp in microseconds; `None` means the limit never
    /// expires (the sentinel agreed with the frontend rate enforcer).
    pub expiration_us: Option<u64>,
}

impl ClientTagLimit {
    /// Creates a never-expiring limit.
    #[must_use]
    pub const fn never_expiring(tps: f64) -> Self {
        Self {
            tps,
            expiration_us: None,
        }
    }
}

/// Statistics tracked per tag: the operator quota, the smoothed incoming
/// transaction rate, and the smoothed history of published per-client limits.
#[derive(Debug)]
pub struct TagStatistics {
    quota: Option<Quota>,
    transaction_counter: Smoother,
    per_client_rate: Smoother,
}

impl TagStatistics {
    /// Creates statistics with no quota and zeroed counters.
    #[must_use]
    pub fn new(folding_time_us: u64, now_us: u64) -> Self {
        Self {
            quota: None,
            transaction_counter: Smoother::new(folding_time_us, now_us),
            per_client_rate: Smoother::new(folding_time_us, now_us),
        }
    }

    /// Returns the tag's quota, if one is set.
    #[must_use]
    pub const fn quota(&self) -> Option<Quota> {
        self.quota
    }

    /// Replaces the tag's quota.
    pub fn set_quota(&mut self, quota: Quota) {
        self.quota = Some(quota);
    }

    /// Removes the tag's quota. The tag stops producing limits but its
    /// counters keep running.
    pub fn clear_quota(&mut self) {
        self.quota = None;
    }

    /// Records `count` newly started transactions for this tag.
    pub fn add_transactions(&mut self, count: u32, now_us: u64) {
        self.transaction_counter.add_delta(f64::from(count), now_us);
    }

    /// Returns the smoothed cluster-wide TPS observed for this tag.
    #[must_use]
    pub fn transaction_rate(&self, now_us: u64) -> f64 {
        self.transaction_counter.smoothed_rate(now_us)
    }

    /// Folds a new target TPS into the per-client limit and returns the limit
    /// to publish.
    ///
    /// Let `R` be the observed cluster-wide TPS and `P_prev` the smoothed
    /// previously-published per-client rate. The new rate is
    ///
    /// ```text
    /// P_new = max(min_rate, min(target, (target / R) · P_prev))
    /// ```
    ///
    /// `target / R` is the fraction of current demand the controller wants to
    /// admit; scaling `P_prev` by it walks the per-client limit toward the
    /// level that yields `target` aggregate TPS under uniform compliance. The
    /// `min(target, ..)` clamp keeps one client from being granted the whole
    /// cluster target's worth of headroom twice over; `min_rate` prevents
    /// collapse to zero.
    ///
    /// Returns `None` (and leaves the smoother untouched) when the target is
    /// absent or no transactions have been observed. The returned limit
    /// carries `P_new` itself; the smoother only carries the value forward as
    /// the next cycle's `P_prev`.
    pub fn update_and_get_per_client_limit(
        &mut self,
        target_tps: Option<f64>,
        min_rate: f64,
        now_us: u64,
    ) -> Option<ClientTagLimit> {
        let target = target_tps?;
        let rate = self.transaction_counter.smoothed_rate(now_us);
        if rate <= 0.0 {
            return None;
        }
        let previous = self.per_client_rate.smoothed_total(now_us);
        let new_rate = min_rate.max(target.min((target / rate) * previous));
        self.per_client_rate.set_total(new_rate, now_us);
        Some(ClientTagLimit::never_expiring(new_rate))
    }
}
