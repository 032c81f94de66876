//! Storage-server telemetry intake types.
//!
//! Each storage server periodically reports the tags producing the most read
//! and write work on it, along with the cost rate each is generating. The
//! throttler consumes these records verbatim; producing them is the telemetry
//! pipeline's concern.

use weir_core::{ServerId, Tag};

/// One busiest-tag cost sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TagCostSample {
    /// The tag generating the work.
    pub tag: Tag,
    /// Cost rate in bytes per second.
    pub rate: f64,
    /// Fraction of the server's busyness attributed to the tag. Reported by
    /// storage servers for other consumers; this throttler ignores it.
    pub fractional_busyness: f64,
}

impl TagCostSample {
    /// Creates a sample with zero fractional busyness.
    #[must_use]
    pub const fn new(tag: Tag, rate: f64) -> Self {
        Self {
            tag,
            rate,
            fractional_busyness: 0.0,
        }
    }
}

/// A storage server's periodic queue report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageQueueInfo {
    /// The reporting server.
    pub server: ServerId,
    /// Tags producing the most read work on this server.
    pub busiest_read_tags: Vec<TagCostSample>,
    /// Tags producing the most write work on this server.
    pub busiest_write_tags: Vec<TagCostSample>,
}

impl StorageQueueInfo {
    /// Creates an empty report for `server`.
    #[must_use]
    pub const fn new(server: ServerId) -> Self {
        Self {
            server,
            busiest_read_tags: Vec::new(),
            busiest_write_tags: Vec::new(),
        }
    }

    /// Appends a busiest-read-tag sample.
    #[must_use]
    pub fn with_read_tag(mut self, tag: Tag, rate: f64) -> Self {
        self.busiest_read_tags.push(TagCostSample::new(tag, rate));
        self
    }

    /// Appends a busiest-write-tag sample.
    #[must_use]
    pub fn with_write_tag(mut self, tag: Tag, rate: f64) -> Self {
        self.busiest_write_tags.push(TagCostSample::new(tag, rate));
        self
    }
}
