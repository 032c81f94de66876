//! Durable quota storage integration for the Weir tag throttler.
//!
//! Operator quotas live in the transactional key-value store shared with the
//! rest of the system. This crate owns everything on the throttler's side of
//! that boundary:
//!
//! - [`codec`]: the quota key layout and 32-byte value format
//! - [`source`]: the read-only [`QuotaSource`] transaction traits and an
//!   in-memory implementation for simulation
//! - [`watcher`]: the background task that reloads the quota table into a
//!   shared [`GlobalTagThrottler`](weir_throttle::GlobalTagThrottler)
//!
//! The watcher never writes to the store and never stops: transient read
//! failures are retried through the source's own backoff discipline, and
//! malformed rows are logged and skipped.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod source;
pub mod watcher;

pub use error::{QuotaError, QuotaResult};
pub use source::{MemoryQuotaSource, QuotaKv, QuotaReadTx, QuotaSource};
pub use watcher::{QuotaWatcher, WatcherConfig};
