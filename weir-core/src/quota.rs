//! Per-tag cost quotas.
//!
//! Quotas are specified as cost rates: bytes of read or write work per
//! second, cluster-wide. The total quota is a ceiling; the reserved quota is
//! a floor the throttler honors even when storage servers are saturated.

use crate::error::{Error, Result};
use crate::types::OpType;

/// The persisted quota for one transaction tag.
///
/// All four fields are cost rates in bytes per second. Invariants (enforced
/// by [`Quota::validate`]): every field is non-negative, and each reserved
/// quota does not exceed the matching total quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quota {
    /// Cluster-wide ceiling on read cost.
    pub total_read: i64,
    /// Cluster-wide ceiling on write cost.
    pub total_write: i64,
    /// Read cost rate guaranteed to the tag even under saturation.
    pub reserved_read: i64,
    /// Write cost rate guaranteed to the tag even under saturation.
    pub reserved_write: i64,
}

impl Quota {
    /// Creates a quota with the given total ceilings and zero reservations.
    #[must_use]
    pub const fn with_totals(total_read: i64, total_write: i64) -> Self {
        Self {
            total_read,
            total_write,
            reserved_read: 0,
            reserved_write: 0,
        }
    }

    /// Sets the reserved read quota.
    #[must_use]
    pub const fn with_reserved_read(mut self, reserved: i64) -> Self {
        self.reserved_read = reserved;
        self
    }

    /// Sets the reserved write quota.
    #[must_use]
    pub const fn with_reserved_write(mut self, reserved: i64) -> Self {
        self.reserved_write = reserved;
        self
    }

    /// Returns the total quota for the given operation kind.
    #[must_use]
    pub const fn total(&self, op: OpType) -> i64 {
        match op {
            OpType::Read => self.total_read,
            OpType::Write => self.total_write,
        }
    }

    /// Returns the reserved quota for the given operation kind.
    #[must_use]
    pub const fn reserved(&self, op: OpType) -> i64 {
        match op {
            OpType::Read => self.reserved_read,
            OpType::Write => self.reserved_write,
        }
    }

    /// Validates the quota's internal invariants.
    ///
    /// # Errors
    /// Returns an error if any field is negative or a reservation exceeds
    /// its total.
    pub fn validate(&self) -> Result<()> {
        if self.total_read < 0 {
            return Err(Error::InvalidArgument {
                name: "total_read",
                reason: "must be non-negative",
            });
        }
        if self.total_write < 0 {
            return Err(Error::InvalidArgument {
                name: "total_write",
                reason: "must be non-negative",
            });
        }
        if self.reserved_read < 0 {
            return Err(Error::InvalidArgument {
                name: "reserved_read",
                reason: "must be non-negative",
            });
        }
        if self.reserved_write < 0 {
            return Err(Error::InvalidArgument {
                name: "reserved_write",
                reason: "must be non-negative",
            });
        }
        if self.reserved_read > self.total_read {
            return Err(Error::InvalidArgument {
                name: "reserved_read",
                reason: "must be <= total_read",
            });
        }
        if self.reserved_write > self.total_write {
            return Err(Error::InvalidArgument {
                name: "reserved_write",
                reason: "must be <= total_write",
            });
        }
        Ok(())
    }
}
