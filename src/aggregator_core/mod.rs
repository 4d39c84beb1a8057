//! Aggregator Core - time-bucketed, mergeable-summary aggregation engine
//!
//! # Architecture
//!
//! ```text
//! ClientStatsPayload → StatsAggregator (bounded channel)
//!     ↓
//! Aggregator engine: window-start truncation → StatsBucket
//!     ↓
//! StatsBucket: (AggregationKey, pipeline hash) → merged QuantileSummary
//!     ↓  flush ticker (elapsed windows) / shutdown drain (all windows)
//! RollupSink (JSONL or channel)
//! ```

pub mod bucket;
pub mod engine;
pub mod ingestion;
pub mod sink;
pub mod window;

pub use bucket::{AggregationKey, StatsBucket, StatsPoint};
pub use engine::{AggregationCounters, Aggregator};
pub use ingestion::StatsAggregator;
pub use sink::{ChannelRollupSink, JsonlRollupSink, RollupSink, SinkError};
pub use window::{BUCKET_DURATION, FLUSH_INTERVAL};
