//! The global tag throttler facade and its cost/rate calculus.
//!
//! Terminology used throughout (all cost figures are bytes/sec):
//!
//! - **Current cost**: the smoothed cost rate actually being observed,
//!   independent of any quota.
//! - **Desired TPS**: the TPS a tag could run at if it consumed its entire
//!   total quota at the current per-transaction cost.
//! - **Reserved TPS**: the TPS floor implied by the reserved quota; honored
//!   even when storage servers are saturated.
//! - **Limiting TPS**: the TPS ceiling implied by storage-server health,
//!   partitioned among tags by their share of total quota.
//! - **Target TPS**: `max(reserved, min(limiting, desired))` — what the
//!   controller aims for across all clients of a tag.
//! - **Per-client TPS**: the published limit; uniform compliance by every
//!   client yields the target cluster-wide.

use std::collections::HashMap;

use tracing::{debug, trace};
use weir_core::{OpType, Priority, Quota, ServerId, Tag};

use crate::counters::ThroughputCounters;
use crate::tag_stats::{ClientTagLimit, TagStatistics};
use crate::telemetry::StorageQueueInfo;

/// The published rate map: per priority, per tag, one client limit.
///
/// Both priorities currently receive identical limits; the split keeps the
/// map shape uniform for the frontend enforcer.
pub type ClientRateMap = HashMap<Priority, HashMap<Tag, ClientTagLimit>>;

/// Configuration for the global tag throttler.
#[derive(Debug, Clone)]
pub struct ThrottlerConfig {
    /// E-folding time for every smoother in the throttler, in microseconds.
    pub folding_time_us: u64,

    /// Floor for published per-client TPS limits. Must be positive so a
    /// throttled tag can always make some progress and grow back.
    pub min_tag_rate: f64,
}

impl ThrottlerConfig {
    /// Creates a configuration with the given folding time and rate floor.
    #[must_use]
    pub const fn new(folding_time_us: u64, min_tag_rate: f64) -> Self {
        Self {
            folding_time_us,
            min_tag_rate,
        }
    }

    /// Creates a configuration for testing (short folding time for fast
    /// convergence).
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            folding_time_us: 1_000_000, // 1 second.
            min_tag_rate: 1.0,
        }
    }
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            folding_time_us: 10_000_000, // 10 seconds.
            min_tag_rate: 1.0,
        }
    }
}

/// The cluster-level tag throttler.
///
/// Owns all control-loop state; every operation is total and non-suspending.
/// Not safe for parallel mutation — callers funnel access through one logical
/// task (see [`SharedThrottler`](crate::SharedThrottler)).
pub struct GlobalTagThrottler {
    config: ThrottlerConfig,

    /// Latest health signal per storage server. The entry's inner `None`
    /// means the server has not produced a signal (or cleared it).
    throttling_ratios: HashMap<ServerId, Option<f64>>,

    /// Control state per tag, aggregated across all storage servers.
    tag_statistics: HashMap<Tag, TagStatistics>,

    /// Smoothed cost rates per (storage server, tag).
    throughput: HashMap<ServerId, HashMap<Tag, ThroughputCounters>>,

    /// Incremented whenever a quota snapshot is applied; consumers use it to
    /// invalidate caches.
    quota_change_id: u64,
}

impl GlobalTagThrottler {
    /// Creates an empty throttler.
    #[must_use]
    pub fn new(config: ThrottlerConfig) -> Self {
        Self {
            config,
            throttling_ratios: HashMap::new(),
            tag_statistics: HashMap::new(),
            throughput: HashMap::new(),
            quota_change_id: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    /// Ingests one storage server's busiest-tag cost report.
    pub fn ingest_telemetry(&mut self, info: &StorageQueueInfo, now_us: u64) {
        trace!(
            server = %info.server,
            read_tags = info.busiest_read_tags.len(),
            write_tags = info.busiest_write_tags.len(),
            "ingesting storage queue info"
        );
        for sample in &info.busiest_read_tags {
            self.record_cost(info.server, &sample.tag, sample.rate, OpType::Read, now_us);
        }
        for sample in &info.busiest_write_tags {
            self.record_cost(info.server, &sample.tag, sample.rate, OpType::Write, now_us);
        }
    }

    /// Replaces a storage server's throttling ratio. `None` clears the health
    /// signal, withholding that server's limiting vote.
    pub fn set_throttling_ratio(&mut self, server: ServerId, ratio: Option<f64>) {
        self.throttling_ratios.insert(server, ratio);
    }

    /// Sets a tag's quota in memory. Does not reach the durable store; the
    /// quota watcher's next full pass overrides in-memory edits.
    pub fn set_quota(&mut self, tag: Tag, quota: Quota, now_us: u64) {
        trace!(%tag, ?quota, "setting quota");
        self.stats_entry(tag, now_us).set_quota(quota);
    }

    /// Removes a tag's quota in memory. The tag stops producing limits.
    pub fn remove_quota(&mut self, tag: &Tag) {
        trace!(%tag, "removing quota");
        if let Some(stats) = self.tag_statistics.get_mut(tag) {
            stats.clear_quota();
        }
    }

    /// Records `count` transactions started by frontends for `tag`.
    pub fn add_requests(&mut self, tag: Tag, count: u32, now_us: u64) {
        self.stats_entry(tag, now_us).add_transactions(count, now_us);
    }

    /// Applies a full quota snapshot from the durable store: upserts every
    /// quota, prunes tags absent from the snapshot, and bumps the quota
    /// change id. Returns the new change id.
    ///
    /// This is the quota watcher's commit step; doing all three parts in one
    /// non-suspending call is what keeps [`Self::get_client_rates`] snapshots
    /// consistent.
    pub fn apply_quota_snapshot(&mut self, quotas: &[(Tag, Quota)], now_us: u64) -> u64 {
        for (tag, quota) in quotas {
            self.stats_entry(tag.clone(), now_us).set_quota(*quota);
        }
        self.tag_statistics
            .retain(|tag, _| quotas.iter().any(|(seen, _)| seen == tag));
        self.quota_change_id += 1;
        debug!(
            tags = quotas.len(),
            change_id = self.quota_change_id,
            "applied quota snapshot"
        );
        self.quota_change_id
    }

    // -------------------------------------------------------------------------
    // Published state
    // -------------------------------------------------------------------------

    /// Computes the per-priority, per-tag client rate map.
    ///
    /// All-or-nothing: if any tracked tag's target is undefined (it has no
    /// quota, or no usable cost/traffic signal yet), the result is empty and
    /// no per-tag state is modified. The frontend treats an empty map as "no
    /// overrides", and any published map is a self-consistent snapshot
    /// covering every tracked tag.
    pub fn get_client_rates(&mut self, now_us: u64) -> ClientRateMap {
        let mut targets = Vec::with_capacity(self.tag_statistics.len());
        for tag in self.tag_statistics.keys() {
            match self.target_tps(tag, now_us) {
                Some(target) => targets.push((tag.clone(), target)),
                None => {
                    trace!(%tag, "target undefined, withholding all client rates");
                    return ClientRateMap::new();
                }
            }
        }

        let min_rate = self.config.min_tag_rate;
        let mut result = ClientRateMap::new();
        for (tag, target) in targets {
            let stats = self
                .tag_statistics
                .get_mut(&tag)
                .expect("targets computed from current tag set");
            let limit = stats
                .update_and_get_per_client_limit(Some(target), min_rate, now_us)
                .expect("defined target implies positive transaction rate");
            for priority in Priority::ALL {
                result
                    .entry(priority)
                    .or_default()
                    .insert(tag.clone(), limit);
            }
        }
        result
    }

    /// The monotonically increasing id of the last applied quota snapshot.
    #[must_use]
    pub const fn quota_change_id(&self) -> u64 {
        self.quota_change_id
    }

    /// Number of tags currently under management.
    #[must_use]
    pub fn auto_throttle_count(&self) -> usize {
        self.tag_statistics.len()
    }

    /// Number of tags currently read-busy. Always zero: busy-tag accounting
    /// is not part of quota-driven throttling.
    #[must_use]
    pub const fn busy_read_tag_count(&self) -> u32 {
        0
    }

    /// Number of tags currently write-busy. Always zero, as for
    /// [`Self::busy_read_tag_count`].
    #[must_use]
    pub const fn busy_write_tag_count(&self) -> u32 {
        0
    }

    /// Number of operator-pushed manual throttles. Always zero: this
    /// throttler only computes automatic quota-driven limits.
    #[must_use]
    pub const fn manual_throttle_count(&self) -> usize {
        0
    }

    /// Whether automatic throttling is enabled. Always true.
    #[must_use]
    pub const fn is_auto_throttling_enabled(&self) -> bool {
        true
    }

    // -------------------------------------------------------------------------
    // Internal: state maintenance
    // -------------------------------------------------------------------------

    fn stats_entry(&mut self, tag: Tag, now_us: u64) -> &mut TagStatistics {
        let folding = self.config.folding_time_us;
        self.tag_statistics
            .entry(tag)
            .or_insert_with(|| TagStatistics::new(folding, now_us))
    }

    fn record_cost(&mut self, server: ServerId, tag: &Tag, rate: f64, op: OpType, now_us: u64) {
        let folding = self.config.folding_time_us;
        self.throughput
            .entry(server)
            .or_default()
            .entry(tag.clone())
            .or_insert_with(|| ThroughputCounters::new(folding, now_us))
            .update_cost(rate, op, now_us);
        // Telemetry is one of the lazy-creation triggers for per-tag state.
        self.stats_entry(tag.clone(), now_us);
    }

    // -------------------------------------------------------------------------
    // Internal: cost/rate calculus (pure reads)
    // -------------------------------------------------------------------------

    /// Smoothed cost rate for `tag` on `server`; absent if the pair has never
    /// appeared in telemetry.
    fn cost_on_server_for_tag(
        &self,
        server: ServerId,
        tag: &Tag,
        op: OpType,
        now_us: u64,
    ) -> Option<f64> {
        Some(self.throughput.get(&server)?.get(tag)?.cost(op, now_us))
    }

    /// Smoothed cost rate on `server` summed across tags; absent if the
    /// server has never reported.
    fn cost_on_server(&self, server: ServerId, op: OpType, now_us: u64) -> Option<f64> {
        let tag_costs = self.throughput.get(&server)?;
        Some(tag_costs.values().map(|c| c.cost(op, now_us)).sum())
    }

    /// Smoothed cost rate for `tag` summed across servers, with unreported
    /// pairs counting as zero.
    fn cost_for_tag(&self, tag: &Tag, op: OpType, now_us: u64) -> f64 {
        self.throughput
            .keys()
            .filter_map(|&server| self.cost_on_server_for_tag(server, tag, op, now_us))
            .sum()
    }

    /// Average bytes per transaction that `tag` incurs on `server`.
    fn average_cost_on_server(
        &self,
        tag: &Tag,
        server: ServerId,
        op: OpType,
        now_us: u64,
    ) -> Option<f64> {
        let cost = self.cost_on_server_for_tag(server, tag, op, now_us)?;
        let rate = self.tag_statistics.get(tag)?.transaction_rate(now_us);
        if rate == 0.0 {
            None
        } else {
            Some(cost / rate)
        }
    }

    /// Average bytes per transaction that `tag` incurs cluster-wide.
    fn average_cost(&self, tag: &Tag, op: OpType, now_us: u64) -> Option<f64> {
        let cost = self.cost_for_tag(tag, op, now_us);
        let rate = self.tag_statistics.get(tag)?.transaction_rate(now_us);
        if rate == 0.0 {
            None
        } else {
            Some(cost / rate)
        }
    }

    fn total_quota(&self, tag: &Tag, op: OpType) -> Option<f64> {
        let quota = self.tag_statistics.get(tag)?.quota()?;
        #[allow(clippy::cast_precision_loss)] // Quotas are operator-scale integers.
        let total = quota.total(op) as f64;
        Some(total)
    }

    fn reserved_quota(&self, tag: &Tag, op: OpType) -> Option<f64> {
        let quota = self.tag_statistics.get(tag)?.quota()?;
        #[allow(clippy::cast_precision_loss)]
        let reserved = quota.reserved(op) as f64;
        Some(reserved)
    }

    /// Of all tags currently producing work on `server`, the fraction of
    /// total quota held by `tag`. Zero when the tag holds no quota there.
    fn quota_ratio(&self, tag: &Tag, server: ServerId, op: OpType) -> f64 {
        let mut sum_quota = 0.0;
        let mut tag_quota = 0.0;
        if let Some(tag_costs) = self.throughput.get(&server) {
            for t in tag_costs.keys() {
                let quota = self.total_quota(t, op).unwrap_or(0.0);
                sum_quota += quota;
                if t == tag {
                    tag_quota = quota;
                }
            }
        }
        if tag_quota == 0.0 {
            return 0.0;
        }
        assert!(sum_quota > 0.0, "a positive tag quota implies a positive sum");
        tag_quota / sum_quota
    }

    /// The cost rate `server` should be held to: its health ratio times its
    /// current cost. Absent unless both the health signal and a cost
    /// measurement exist.
    fn limiting_cost(&self, server: ServerId, op: OpType, now_us: u64) -> Option<f64> {
        let ratio = (*self.throttling_ratios.get(&server)?)?;
        let current_cost = self.cost_on_server(server, op, now_us)?;
        Some(ratio * current_cost)
    }

    /// The TPS ceiling `server`'s health implies for `tag`.
    fn limiting_tps_on_server(
        &self,
        server: ServerId,
        tag: &Tag,
        op: OpType,
        now_us: u64,
    ) -> Option<f64> {
        let quota_ratio = self.quota_ratio(tag, server, op);
        let limiting_cost = self.limiting_cost(server, op, now_us)?;
        let average_cost = self.average_cost_on_server(tag, server, op, now_us)?;
        Some(limiting_cost * quota_ratio / average_cost)
    }

    /// The TPS ceiling storage health implies for `tag`: the minimum vote
    /// across servers, with voteless servers abstaining. Absent when no
    /// server votes.
    fn limiting_tps_for_op(&self, tag: &Tag, op: OpType, now_us: u64) -> Option<f64> {
        self.throttling_ratios
            .keys()
            .filter_map(|&server| self.limiting_tps_on_server(server, tag, op, now_us))
            .reduce(f64::min)
    }

    fn limiting_tps(&self, tag: &Tag, now_us: u64) -> Option<f64> {
        min_opt(
            self.limiting_tps_for_op(tag, OpType::Read, now_us),
            self.limiting_tps_for_op(tag, OpType::Write, now_us),
        )
    }

    /// The TPS that would exactly consume the tag's total quota.
    fn desired_tps_for_op(&self, tag: &Tag, op: OpType, now_us: u64) -> Option<f64> {
        let average_cost = self.average_cost(tag, op, now_us)?;
        if average_cost == 0.0 {
            return None;
        }
        let total_quota = self.total_quota(tag, op)?;
        Some(total_quota / average_cost)
    }

    fn desired_tps(&self, tag: &Tag, now_us: u64) -> Option<f64> {
        min_opt(
            self.desired_tps_for_op(tag, OpType::Read, now_us),
            self.desired_tps_for_op(tag, OpType::Write, now_us),
        )
    }

    /// The TPS floor the tag's reserved quota guarantees.
    fn reserved_tps_for_op(&self, tag: &Tag, op: OpType, now_us: u64) -> Option<f64> {
        let reserved_quota = self.reserved_quota(tag, op)?;
        let average_cost = self.average_cost(tag, op, now_us)?;
        if average_cost == 0.0 {
            return None;
        }
        Some(reserved_quota / average_cost)
    }

    /// The reservation is honored for the dominant workload direction, so
    /// per-tag reserved TPS takes the maximum across operation kinds.
    fn reserved_tps(&self, tag: &Tag, now_us: u64) -> Option<f64> {
        max_opt(
            self.reserved_tps_for_op(tag, OpType::Read, now_us),
            self.reserved_tps_for_op(tag, OpType::Write, now_us),
        )
    }

    /// The target TPS for `tag`: `max(reserved, min(limiting, desired))`.
    ///
    /// `desired` and `reserved` must be defined; an absent `limiting` means
    /// no storage server is constraining the tag and drops out of the min.
    fn target_tps(&self, tag: &Tag, now_us: u64) -> Option<f64> {
        let desired = self.desired_tps(tag, now_us)?;
        let reserved = self.reserved_tps(tag, now_us)?;
        let capped = self
            .limiting_tps(tag, now_us)
            .map_or(desired, |limiting| limiting.min(desired));
        Some(reserved.max(capped))
    }
}

/// Minimum of two optional values, with a single present value passing
/// through.
fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

/// Maximum of two optional values, with a single present value passing
/// through.
fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}
