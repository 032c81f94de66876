//! Deterministic simulation harness for the tag throttler.
//!
//! Reproduces the production control loop in miniature, under a plain `u64`
//! microsecond clock the test advances itself:
//!
//! - [`MockStorageServer`] accounts per-tag cost with the same exponential
//!   smoothing the real telemetry pipeline applies, and derives its health
//!   ratio from a spring band around its target cost rate.
//! - [`SimClient`] fires transactions at its desired TPS, capped by whatever
//!   limit the throttler most recently published.
//! - [`Simulation`] steps the whole system: clients fire in 10ms ticks,
//!   telemetry and ratios feed the throttler once per second, and the
//!   published rate map refreshes at the same cadence.

use std::collections::BTreeMap;

use weir_core::{Priority, Quota, ServerId, Tag};
use weir_throttle::{
    ClientRateMap, GlobalTagThrottler, Smoother, StorageQueueInfo, ThrottlerConfig,
};

/// Microseconds per simulated second.
pub const SEC: u64 = 1_000_000;

/// Client scheduling granularity.
const TICK_US: u64 = 10_000;

/// Folding time for the mock servers' cost accounting, matching the
/// smoothing the storage-side telemetry applies before reporting.
const COST_FOLDING_US: u64 = 5_000_000;

// -----------------------------------------------------------------------------
// MockStorageServer
// -----------------------------------------------------------------------------

/// A storage server simulated only as a cost accountant.
pub struct MockStorageServer {
    id: ServerId,
    target_cost_rate: f64,
    read_costs: BTreeMap<Tag, Smoother>,
    write_costs: BTreeMap<Tag, Smoother>,
    total_read_cost: Smoother,
    total_write_cost: Smoother,
}

impl MockStorageServer {
    /// Creates a server that can sustain `target_cost_rate` bytes/sec.
    ///
    /// # Panics
    /// Panics if the target cost rate is not positive.
    #[must_use]
    pub fn new(id: ServerId, target_cost_rate: f64) -> Self {
        assert!(target_cost_rate > 0.0, "target cost rate must be positive");
        Self {
            id,
            target_cost_rate,
            read_costs: BTreeMap::new(),
            write_costs: BTreeMap::new(),
            total_read_cost: Smoother::new(COST_FOLDING_US, 0),
            total_write_cost: Smoother::new(COST_FOLDING_US, 0),
        }
    }

    /// Accounts `cost` bytes of read work for `tag`.
    pub fn add_read_cost(&mut self, tag: &Tag, cost: f64, now_us: u64) {
        self.read_costs
            .entry(tag.clone())
            .or_insert_with(|| Smoother::new(COST_FOLDING_US, now_us))
            .add_delta(cost, now_us);
        self.total_read_cost.add_delta(cost, now_us);
    }

    /// Accounts `cost` bytes of write work for `tag`.
    pub fn add_write_cost(&mut self, tag: &Tag, cost: f64, now_us: u64) {
        self.write_costs
            .entry(tag.clone())
            .or_insert_with(|| Smoother::new(COST_FOLDING_US, now_us))
            .add_delta(cost, now_us);
        self.total_write_cost.add_delta(cost, now_us);
    }

    /// Produces the busiest-tags report the server would send.
    #[must_use]
    pub fn storage_queue_info(&self, now_us: u64) -> StorageQueueInfo {
        let mut info = StorageQueueInfo::new(self.id);
        for (tag, cost) in &self.read_costs {
            info = info.with_read_tag(tag.clone(), cost.smoothed_rate(now_us));
        }
        for (tag, cost) in &self.write_costs {
            info = info.with_write_tag(tag.clone(), cost.smoothed_rate(now_us));
        }
        info
    }

    /// Derives the server's health ratio.
    ///
    /// A spring band of 20% around the target cost rate: while the current
    /// cost is comfortably below the band there is no signal; inside and
    /// above it, the ratio reports what fraction of the current load the
    /// server could sustain.
    #[must_use]
    pub fn throttling_ratio(&self, now_us: u64) -> Option<f64> {
        let spring = 0.2 * self.target_cost_rate;
        let current =
            self.total_read_cost.smoothed_rate(now_us) + self.total_write_cost.smoothed_rate(now_us);
        if current < self.target_cost_rate - spring {
            None
        } else {
            Some((((self.target_cost_rate + spring) - current) / spring).max(0.0))
        }
    }
}

// -----------------------------------------------------------------------------
// StorageServerCollection
// -----------------------------------------------------------------------------

/// A cluster of mock storage servers with load spread evenly across them.
pub struct StorageServerCollection {
    servers: Vec<MockStorageServer>,
}

impl StorageServerCollection {
    /// Creates `count` servers, each with the given target cost rate.
    ///
    /// # Panics
    /// Panics if `count` is zero.
    #[must_use]
    pub fn new(count: u64, target_cost_rate: f64) -> Self {
        assert!(count > 0, "cluster must have at least one server");
        let servers = (0..count)
            .map(|i| MockStorageServer::new(ServerId::new(i), target_cost_rate))
            .collect();
        Self { servers }
    }

    /// Spreads `cost` bytes of read work for `tag` across all servers.
    pub fn add_read_cost(&mut self, tag: &Tag, cost: f64, now_us: u64) {
        #[allow(clippy::cast_precision_loss)]
        let per_server = cost / self.servers.len() as f64;
        for server in &mut self.servers {
            server.add_read_cost(tag, per_server, now_us);
        }
    }

    /// Spreads `cost` bytes of write work for `tag` across all servers.
    pub fn add_write_cost(&mut self, tag: &Tag, cost: f64, now_us: u64) {
        #[allow(clippy::cast_precision_loss)]
        let per_server = cost / self.servers.len() as f64;
        for server in &mut self.servers {
            server.add_write_cost(tag, per_server, now_us);
        }
    }

    /// Collects every server's queue report.
    #[must_use]
    pub fn queue_infos(&self, now_us: u64) -> Vec<StorageQueueInfo> {
        self.servers
            .iter()
            .map(|s| s.storage_queue_info(now_us))
            .collect()
    }

    /// Collects every server's health ratio.
    #[must_use]
    pub fn throttling_ratios(&self, now_us: u64) -> Vec<(ServerId, Option<f64>)> {
        self.servers
            .iter()
            .map(|s| (s.id, s.throttling_ratio(now_us)))
            .collect()
    }
}

// -----------------------------------------------------------------------------
// SimClient
// -----------------------------------------------------------------------------

/// A client firing transactions for one tag at a fixed desired TPS and
/// per-transaction cost, obeying whatever limit is currently published.
pub struct SimClient {
    tag: Tag,
    desired_tps: f64,
    cost_per_tx: f64,
    write: bool,
    next_fire_us: u64,
}

impl SimClient {
    /// Creates a read-workload client.
    #[must_use]
    pub const fn read(tag: Tag, desired_tps: f64, cost_per_tx: f64) -> Self {
        Self {
            tag,
            desired_tps,
            cost_per_tx,
            write: false,
            next_fire_us: 0,
        }
    }

    /// Creates a write-workload client.
    #[must_use]
    pub const fn write(tag: Tag, desired_tps: f64, cost_per_tx: f64) -> Self {
        Self {
            tag,
            desired_tps,
            cost_per_tx,
            write: true,
            next_fire_us: 0,
        }
    }
}

// -----------------------------------------------------------------------------
// Simulation
// -----------------------------------------------------------------------------

/// The full simulated control loop.
pub struct Simulation {
    throttler: GlobalTagThrottler,
    servers: StorageServerCollection,
    clients: Vec<SimClient>,
    published: ClientRateMap,
    now_us: u64,
}

impl Simulation {
    /// Creates a simulation over `server_count` servers with the given
    /// per-server target cost rate, using the production throttler defaults.
    #[must_use]
    pub fn new(server_count: u64, target_cost_rate: f64) -> Self {
        Self {
            throttler: GlobalTagThrottler::new(ThrottlerConfig::default()),
            servers: StorageServerCollection::new(server_count, target_cost_rate),
            clients: Vec::new(),
            published: ClientRateMap::new(),
            now_us: 0,
        }
    }

    /// Sets a tag's quota on the throttler.
    pub fn set_quota(&mut self, tag: &Tag, quota: Quota) {
        self.throttler.set_quota(tag.clone(), quota, self.now_us);
    }

    /// Removes a tag's quota from the throttler.
    pub fn remove_quota(&mut self, tag: &Tag) {
        self.throttler.remove_quota(tag);
    }

    /// Adds a client workload.
    pub fn add_client(&mut self, client: SimClient) {
        self.clients.push(client);
    }

    /// The most recently published per-client TPS limit for `tag`.
    #[must_use]
    pub fn published_tps(&self, tag: &Tag) -> Option<f64> {
        self.published
            .get(&Priority::Default)
            .and_then(|tags| tags.get(tag))
            .map(|limit| limit.tps)
    }

    /// Read access to the throttler for invariant checks.
    #[must_use]
    pub const fn throttler(&self) -> &GlobalTagThrottler {
        &self.throttler
    }

    /// The full rate map from the most recent publication.
    #[must_use]
    pub const fn published_map(&self) -> &ClientRateMap {
        &self.published
    }

    /// Advances the simulation by one second.
    ///
    /// At the top of the second the throttler ingests fresh telemetry and
    /// health ratios; clients then fire through the second in 10ms ticks,
    /// re-reading a freshly published rate map each tick (production clients
    /// consult the throttler on every transaction).
    pub fn step_second(&mut self) {
        let top = self.now_us;
        for info in self.servers.queue_infos(top) {
            self.throttler.ingest_telemetry(&info, top);
        }
        for (server, ratio) in self.servers.throttling_ratios(top) {
            self.throttler.set_throttling_ratio(server, ratio);
        }

        for _ in 0..(SEC / TICK_US) {
            self.published = self.throttler.get_client_rates(self.now_us);
            let Self {
                throttler,
                servers,
                clients,
                published,
                now_us,
            } = self;
            for client in clients.iter_mut() {
                let limit = published
                    .get(&Priority::Default)
                    .and_then(|tags| tags.get(&client.tag))
                    .map(|l| l.tps);
                let rate = limit.map_or(client.desired_tps, |l| client.desired_tps.min(l));
                while client.next_fire_us < *now_us + TICK_US {
                    let fire_at = client.next_fire_us;
                    if client.write {
                        servers.add_write_cost(&client.tag, client.cost_per_tx, fire_at);
                    } else {
                        servers.add_read_cost(&client.tag, client.cost_per_tx, fire_at);
                    }
                    throttler.add_requests(client.tag.clone(), 1, fire_at);
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let interval = (SEC as f64 / rate) as u64;
                    client.next_fire_us = fire_at + interval.max(1);
                }
            }
            *now_us += TICK_US;
        }
    }

    /// Steps until `tag`'s published limit sits within 1 TPS of `expected`
    /// (or stays absent, when `expected` is `None`) for three consecutive
    /// seconds. Returns false if that does not happen within `max_seconds`.
    pub fn run_until_stable(
        &mut self,
        tag: &Tag,
        expected: Option<f64>,
        max_seconds: u64,
    ) -> bool {
        self.run_until_stable_all(&[(tag.clone(), expected)], max_seconds)
    }

    /// Multi-tag form of [`Self::run_until_stable`]: every expectation must
    /// hold simultaneously for three consecutive seconds.
    pub fn run_until_stable_all(
        &mut self,
        expectations: &[(Tag, Option<f64>)],
        max_seconds: u64,
    ) -> bool {
        let mut successes = 0;
        for _ in 0..max_seconds {
            self.step_second();
            let all_ok = expectations.iter().all(|(tag, expected)| {
                let current = self.published_tps(tag);
                tracing::debug!(%tag, ?current, ?expected, "rate monitor");
                match (current, expected) {
                    (Some(current), Some(expected)) => (current - expected).abs() < 1.0,
                    (None, None) => true,
                    _ => false,
                }
            });
            successes = if all_ok { successes + 1 } else { 0 };
            if successes == 3 {
                return true;
            }
        }
        false
    }
}
