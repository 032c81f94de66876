//! Read access to the durable quota table.
//!
//! The quota table lives in the transactional key-value store shared with the
//! rest of the system. The watcher only ever reads it, through the narrow
//! traits below; a simulated in-memory implementation is provided for tests
//! and single-process deployments.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use weir_core::{Quota, Tag};

use crate::codec;
use crate::error::{QuotaError, QuotaResult};

/// One key-value pair read from the quota table.
#[derive(Debug, Clone)]
pub struct QuotaKv {
    /// Full storage key, including the quota prefix.
    pub key: Bytes,
    /// Encoded quota value.
    pub value: Bytes,
}

/// A read-only transaction against the quota table.
///
/// Implementations are expected to open the transaction with system-keyspace
/// access, read-lock-aware semantics, and system-immediate priority, so the
/// watcher can observe quotas even while the store is locked for maintenance.
#[async_trait]
pub trait QuotaReadTx: Send {
    /// Reads every key-value pair under `prefix`, up to `limit` rows.
    ///
    /// # Errors
    /// Returns an error if the store cannot currently serve the read.
    async fn read_range(&mut self, prefix: &[u8], limit: u32) -> QuotaResult<Vec<QuotaKv>>;

    /// Applies the source's retry discipline to a failed read.
    ///
    /// Returning `Ok(())` means the transaction has been reset (with any
    /// appropriate backoff already awaited) and the read should be retried.
    ///
    /// # Errors
    /// Returns the error back when the transaction cannot be retried; the
    /// caller abandons it and opens a fresh one.
    async fn on_error(&mut self, err: QuotaError) -> QuotaResult<()>;
}

/// A handle to the durable quota store.
pub trait QuotaSource: Send + Sync {
    /// The transaction type this source produces.
    type Tx: QuotaReadTx;

    /// Opens a read-only transaction with the options described on
    /// [`QuotaReadTx`].
    fn open_read_tx(&self) -> Self::Tx;
}

// -----------------------------------------------------------------------------
// In-memory source
// -----------------------------------------------------------------------------

/// Backoff between retries of the in-memory source.
const MEMORY_RETRY_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct MemoryInner {
    rows: BTreeMap<Bytes, Bytes>,
    /// Number of upcoming reads that fail with `Unavailable`.
    failures_remaining: u32,
}

/// An in-process quota table for simulation and tests.
///
/// Cloning shares the underlying table. Transient failures can be injected
/// to exercise the watcher's retry path.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuotaSource {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryQuotaSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `quota` for `tag`, encoded exactly as the durable store would.
    pub fn set_quota(&self, tag: &Tag, quota: &Quota) {
        let mut inner = self.inner.lock().expect("quota table lock");
        inner
            .rows
            .insert(codec::quota_key(tag), codec::encode_quota(quota));
    }

    /// Removes `tag`'s quota row.
    pub fn remove_quota(&self, tag: &Tag) {
        let mut inner = self.inner.lock().expect("quota table lock");
        inner.rows.remove(&codec::quota_key(tag));
    }

    /// Stores a raw row, for exercising malformed-value handling.
    pub fn put_raw(&self, key: Bytes, value: Bytes) {
        let mut inner = self.inner.lock().expect("quota table lock");
        inner.rows.insert(key, value);
    }

    /// Makes the next `count` reads fail with a transient error.
    pub fn inject_failures(&self, count: u32) {
        let mut inner = self.inner.lock().expect("quota table lock");
        inner.failures_remaining = count;
    }
}

impl QuotaSource for MemoryQuotaSource {
    type Tx = MemoryQuotaTx;

    fn open_read_tx(&self) -> MemoryQuotaTx {
        MemoryQuotaTx {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read transaction over a [`MemoryQuotaSource`].
#[derive(Debug)]
pub struct MemoryQuotaTx {
    inner: Arc<Mutex<MemoryInner>>,
}

#[async_trait]
impl QuotaReadTx for MemoryQuotaTx {
    async fn read_range(&mut self, prefix: &[u8], limit: u32) -> QuotaResult<Vec<QuotaKv>> {
        let mut inner = self.inner.lock().expect("quota table lock");
        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Err(QuotaError::Unavailable {
                reason: "injected failure".to_string(),
            });
        }
        Ok(inner
            .rows
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .take(limit as usize)
            .map(|(key, value)| QuotaKv {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn on_error(&mut self, err: QuotaError) -> QuotaResult<()> {
        match err {
            QuotaError::Unavailable { .. } => {
                tokio::time::sleep(MEMORY_RETRY_BACKOFF).await;
                Ok(())
            }
            other => Err(other),
        }
    }
}
