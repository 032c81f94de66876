//! Strongly-typed identifiers and enums for Weir entities.
//!
//! Explicit types prevent bugs from mixing up IDs; all IDs are 64-bit to
//! handle large-scale deployments.

use std::fmt;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (a `ServerId` is not interchangeable with a raw u64)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(ServerId, "ss", "Unique identifier for a storage server replica.");

/// The kind of storage operation a cost sample refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    /// Bytes read from storage.
    Read,
    /// Bytes written to storage.
    Write,
}

impl OpType {
    /// Both operation kinds, in a fixed order.
    pub const ALL: [Self; 2] = [Self::Read, Self::Write];
}

/// Transaction priority class, the outer key of the published rate map.
///
/// The throttler currently publishes the same limit for both priorities;
/// the split exists so frontends can consume one map shape regardless of
/// which throttler variant produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Background/batch transactions.
    Batch,
    /// Interactive transactions.
    Default,
}

impl Priority {
    /// All priorities that receive published limits, in a fixed order.
    pub const ALL: [Self; 2] = [Self::Batch, Self::Default];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_display() {
        let id = ServerId::new(42);
        assert_eq!(format!("{id}"), "ss-42");
        assert_eq!(format!("{id:?}"), "ss(42)");
    }

    #[test]
    fn test_server_id_roundtrip() {
        let id = ServerId::from(7_u64);
        assert_eq!(u64::from(id), 7);
    }

    #[test]
    fn test_op_type_all() {
        assert_eq!(OpType::ALL, [OpType::Read, OpType::Write]);
    }
}
