//! Per (storage server, tag) cost accounting.

use weir_core::OpType;

use crate::smoother::Smoother;

/// Smoothed read/write cost rates for one (storage server, tag) pair.
///
/// Telemetry reports an instantaneous cost rate (bytes/sec) per operation
/// kind; each report replaces the matching smoother's total, and the smoothed
/// view is what the rest of the control loop consumes.
#[derive(Debug)]
pub struct ThroughputCounters {
    read_cost: Smoother,
    write_cost: Smoother,
}

impl ThroughputCounters {
    /// Creates counters at zero cost.
    #[must_use]
    pub fn new(folding_time_us: u64, now_us: u64) -> Self {
        Self {
            read_cost: Smoother::new(folding_time_us, now_us),
            write_cost: Smoother::new(folding_time_us, now_us),
        }
    }

    /// Records a new cost-rate sample for the given operation kind.
    ///
    /// Returns the difference between the new sample and the previous one,
    /// for callers that audit telemetry churn.
    pub fn update_cost(&mut self, new_cost: f64, op: OpType, now_us: u64) -> f64 {
        let smoother = match op {
            OpType::Read => &mut self.read_cost,
            OpType::Write => &mut self.write_cost,
        };
        let previous = smoother.total();
        smoother.set_total(new_cost, now_us);
        new_cost - previous
    }

    /// Returns the smoothed cost rate for the given operation kind.
    #[must_use]
    pub fn cost(&self, op: OpType, now_us: u64) -> f64 {
        match op {
            OpType::Read => self.read_cost.smoothed_total(now_us),
            OpType::Write => self.write_cost.smoothed_total(now_us),
        }
    }
}
