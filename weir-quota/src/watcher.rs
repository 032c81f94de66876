//! Background reload of operator quotas into the throttler.
//!
//! The watcher periodically reads the entire quota table and commits the
//! result to the throttler as one snapshot: quotas are upserted, tags absent
//! from the table are pruned, and the quota change id is bumped — all under a
//! single lock acquisition, so rate publication never observes a half-applied
//! reload. A failed or cancelled pass leaves the throttler untouched.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use weir_core::{Quota, Tag};
use weir_throttle::SharedThrottler;

use crate::codec;
use crate::source::{QuotaReadTx, QuotaSource};

/// Configuration for the quota watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay between reload passes.
    pub poll_interval: Duration,

    /// Maximum number of quota rows read per pass.
    pub max_quota_rows: u32,
}

impl WatcherConfig {
    /// Creates a configuration for testing (fast polling).
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_quota_rows: 1024,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_quota_rows: 1_000_000,
        }
    }
}

/// Periodically reloads the quota table into a shared throttler.
pub struct QuotaWatcher<S: QuotaSource> {
    source: S,
    throttler: SharedThrottler,
    config: WatcherConfig,
    /// Origin for the `now_us` timestamps handed to the throttler.
    epoch: Instant,
}

impl<S: QuotaSource> QuotaWatcher<S> {
    /// Creates a watcher. Timestamps handed to the throttler count from this
    /// moment.
    #[must_use]
    pub fn new(source: S, throttler: SharedThrottler, config: WatcherConfig) -> Self {
        Self {
            source,
            throttler,
            config,
            epoch: Instant::now(),
        }
    }

    /// Runs reload passes forever. Stop the watcher by dropping the task.
    pub async fn run(mut self) {
        loop {
            self.poll_once().await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Performs one reload pass.
    ///
    /// Exposed so tests (and callers that want an immediate reload) can step
    /// the watcher without waiting out the poll interval.
    pub async fn poll_once(&mut self) {
        let mut tx = self.source.open_read_tx();
        let rows = loop {
            match tx
                .read_range(codec::TAG_QUOTA_PREFIX, self.config.max_quota_rows)
                .await
            {
                Ok(rows) => break rows,
                Err(err) => {
                    warn!(error = %err, "quota read failed, applying retry policy");
                    if let Err(err) = tx.on_error(err).await {
                        // Not retryable on this transaction; leave state
                        // untouched and try again next pass.
                        warn!(error = %err, "quota reload pass abandoned");
                        return;
                    }
                }
            }
        };

        let mut quotas: Vec<(Tag, Quota)> = Vec::with_capacity(rows.len());
        for kv in rows {
            match Self::decode_row(&kv.key, &kv.value) {
                Ok(entry) => quotas.push(entry),
                Err(err) => {
                    warn!(error = %err, "skipping malformed quota row");
                }
            }
        }

        let now_us = self.now_us();
        let change_id = self
            .throttler
            .lock()
            .expect("throttler lock")
            .apply_quota_snapshot(&quotas, now_us);
        debug!(tags = quotas.len(), change_id, "quota reload pass complete");
    }

    fn decode_row(key: &[u8], value: &[u8]) -> crate::error::QuotaResult<(Tag, Quota)> {
        let tag = codec::tag_from_quota_key(key)?;
        let quota = codec::decode_quota(value)?;
        Ok((tag, quota))
    }

    fn now_us(&self) -> u64 {
        // Elapsed micros fit u64 for any realistic process lifetime.
        #[allow(clippy::cast_possible_truncation)]
        let micros = self.epoch.elapsed().as_micros() as u64;
        micros
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use weir_throttle::ThrottlerConfig;

    use super::*;
    use crate::source::MemoryQuotaSource;

    #[tokio::test(start_paused = true)]
    async fn test_pass_applies_quotas_and_bumps_change_id() {
        let source = MemoryQuotaSource::new();
        source.set_quota(&Tag::from("a"), &Quota::with_totals(100, 0));
        source.set_quota(&Tag::from("b"), &Quota::with_totals(50, 50));

        let throttler = weir_throttle::shared(ThrottlerConfig::for_testing());
        let mut watcher =
            QuotaWatcher::new(source, Arc::clone(&throttler), WatcherConfig::for_testing());
        watcher.poll_once().await;

        let guard = throttler.lock().unwrap();
        assert_eq!(guard.auto_throttle_count(), 2);
        assert_eq!(guard.quota_change_id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_prunes_tags_absent_from_table() {
        let source = MemoryQuotaSource::new();
        source.set_quota(&Tag::from("kept"), &Quota::with_totals(100, 0));

        let throttler = weir_throttle::shared(ThrottlerConfig::for_testing());
        // An in-memory quota not present in the durable table must not
        // survive a reload pass.
        throttler.lock().unwrap().set_quota(
            Tag::from("in-memory-only"),
            Quota::with_totals(10, 10),
            0,
        );

        let mut watcher =
            QuotaWatcher::new(source, Arc::clone(&throttler), WatcherConfig::for_testing());
        watcher.poll_once().await;

        let guard = throttler.lock().unwrap();
        assert_eq!(guard.auto_throttle_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_rows_are_skipped() {
        let source = MemoryQuotaSource::new();
        source.set_quota(&Tag::from("good"), &Quota::with_totals(100, 0));
        let mut bad_key = codec::TAG_QUOTA_PREFIX.to_vec();
        bad_key.extend_from_slice(b"bad");
        source.put_raw(Bytes::from(bad_key), Bytes::from_static(b"short"));

        let throttler = weir_throttle::shared(ThrottlerConfig::for_testing());
        let mut watcher =
            QuotaWatcher::new(source, Arc::clone(&throttler), WatcherConfig::for_testing());
        watcher.poll_once().await;

        let guard = throttler.lock().unwrap();
        assert_eq!(guard.auto_throttle_count(), 1);
        assert_eq!(guard.quota_change_id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_within_one_pass() {
        let source = MemoryQuotaSource::new();
        source.set_quota(&Tag::from("a"), &Quota::with_totals(100, 0));
        source.inject_failures(3);

        let throttler = weir_throttle::shared(ThrottlerConfig::for_testing());
        let mut watcher = QuotaWatcher::new(
            source,
            Arc::clone(&throttler),
            WatcherConfig::for_testing(),
        );
        watcher.poll_once().await;

        let guard = throttler.lock().unwrap();
        assert_eq!(guard.auto_throttle_count(), 1);
        assert_eq!(guard.quota_change_id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_reloads_periodically() {
        let source = MemoryQuotaSource::new();
        source.set_quota(&Tag::from("a"), &Quota::with_totals(100, 0));

        let throttler = weir_throttle::shared(ThrottlerConfig::for_testing());
        let watcher = QuotaWatcher::new(
            source.clone(),
            Arc::clone(&throttler),
            WatcherConfig::for_testing(),
        );
        let handle = tokio::spawn(watcher.run());

        // Several poll intervals of virtual time: the change id keeps rising.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let change_id = throttler.lock().unwrap().quota_change_id();
        assert!(change_id >= 2, "change id was {change_id}");

        // A quota added mid-flight is picked up by a later pass.
        source.set_quota(&Tag::from("b"), &Quota::with_totals(10, 0));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(throttler.lock().unwrap().auto_throttle_count(), 2);

        handle.abort();
    }
}
