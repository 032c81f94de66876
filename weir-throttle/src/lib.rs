//! Global tag throttling for Weir.
//!
//! This crate implements the cluster-level control loop that turns operator
//! cost quotas, storage-server cost telemetry, and storage-server health
//! signals into per-tag, per-client TPS limits:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      GlobalTagThrottler                          │
//! │                                                                  │
//! │  telemetry ──▶ ThroughputCounters ──┐                            │
//! │  (per server)   (per server × tag)  │    cost/rate calculus      │
//! │                                     ├──▶ desired / reserved /    │
//! │  health ratios ─────────────────────┤    limiting ──▶ target     │
//! │  (per server)                       │                  │         │
//! │  quotas + requests ─▶ TagStatistics ┘                  ▼         │
//! │  (per tag)                  ▲               per-client TPS map   │
//! │                             └──────────────── (both priorities)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Determinism
//!
//! All time-dependent operations accept `now_us` as a parameter rather than
//! reading a clock, so the whole control loop can be driven under simulated
//! time. Callers must pass monotone timestamps.
//!
//! # Concurrency
//!
//! The throttler is single-logical-task state: every operation is
//! non-suspending and completes in microseconds, so callers share it behind
//! [`SharedThrottler`] and never hold the lock across a suspension point.

#![warn(missing_docs)]

use std::sync::{Arc, Mutex};

pub mod counters;
pub mod smoother;
pub mod tag_stats;
pub mod telemetry;
pub mod throttler;

pub use counters::ThroughputCounters;
pub use smoother::Smoother;
pub use tag_stats::{ClientTagLimit, TagStatistics};
pub use telemetry::{StorageQueueInfo, TagCostSample};
pub use throttler::{ClientRateMap, GlobalTagThrottler, ThrottlerConfig};

/// A throttler shared between its mutators (telemetry intake, quota watcher,
/// frontend accounting) and the rate publisher.
///
/// A plain mutex is sufficient: critical sections are microsecond-scale and
/// no holder ever suspends, so `get_client_rates` always observes a state
/// between two complete operations.
pub type SharedThrottler = Arc<Mutex<GlobalTagThrottler>>;

/// Creates a [`SharedThrottler`] around a fresh throttler.
#[must_use]
pub fn shared(config: ThrottlerConfig) -> SharedThrottler {
    Arc::new(Mutex::new(GlobalTagThrottler::new(config)))
}
