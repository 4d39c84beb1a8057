//! statflow - statistical aggregation core of a telemetry-collection agent
//!
//! Receives per-client pipeline stats payloads, buckets them into fixed
//! 10-second windows, merges the quantile sketches of reports sharing the
//! same pipeline hash, and periodically exports completed windows as rollup
//! payloads.
//!
//! # Architecture
//!
//! ```text
//! client payloads (JSONL stream) → PayloadTailReader
//!     ↓
//! StatsAggregator (bounded channel, single worker)
//!     ↓
//! Aggregator engine (window buckets, sketch merges)
//!     ↓  flush ticker / shutdown drain
//! RollupSink → JSONL file or channel
//! ```

pub mod aggregator_core;
pub mod config;
pub mod payload;
pub mod reader;
pub mod summary;

/// Agent build version, attached to every emitted rollup.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
