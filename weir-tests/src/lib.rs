//! Weir Tests - deterministic simulation tests for the tag throttler.
//!
//! This crate drives the full control loop under simulated time: a mock
//! storage-server cluster produces cost telemetry and health ratios exactly
//! the way the production telemetry pipeline would, simulated clients obey
//! the published limits, and the scenarios assert that the loop converges to
//! the expected equilibria.
//!
//! Modules:
//!
//! - `sim`: the reusable harness (mock servers, clients, stepped scheduler)
//! - `throttler_tests`: end-to-end convergence scenarios and invariants
//! - `watcher_tests`: quota watcher integration against the in-memory source

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod sim;

// Test modules (only compiled for tests).
#[cfg(test)]
mod throttler_tests;
