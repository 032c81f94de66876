//! Weir Core - Strongly-typed identifiers and shared types for Weir.
//!
//! Weir is a global tag throttler: a cluster-level control loop that limits
//! the transactions-per-second each client may start for a given transaction
//! tag, so that the tag's aggregate cost rate (bytes of read/write work per
//! second) stays within operator quotas and storage-tier capacity.
//!
//! This crate provides the vocabulary shared by every other Weir crate:
//!
//! - **Strongly-typed IDs**: `ServerId` cannot be confused with other u64s
//! - **Opaque tags**: `Tag` is an arbitrary client-supplied byte string
//! - **Quotas**: `Quota` carries the four persisted cost ceilings with
//!   explicit validation
//!
//! # Design Principles
//!
//! - **Explicit types**: cost rates are i64 bytes/sec in the persisted quota,
//!   f64 only inside the control-loop arithmetic
//! - **Explicit validation**: every invariant on a quota is checked in one
//!   place, `Quota::validate`
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod quota;
mod tag;
mod types;

pub use error::{Error, Result};
pub use quota::Quota;
pub use tag::Tag;
pub use types::{OpType, Priority, ServerId};
