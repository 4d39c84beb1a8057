//! Mergeable quantile summaries backed by DDSketch
//!
//! Clients ship their latency distributions as serialized sketches. The
//! aggregator only needs the merge/encode/decode contract: two summaries for
//! the same pipeline hash are merged in place, and completed windows are
//! re-encoded for export.

use serde::{Deserialize, Serialize};
use sketches_ddsketch::{Config as SketchConfig, DDSketch, DDSketchError};

/// Relative accuracy of the sketch (1% error on quantile estimates).
pub const DEFAULT_ALPHA: f64 = 0.01;
/// Bin budget; 2048 bins covers nanosecond-to-hour latencies at 1% accuracy.
pub const DEFAULT_MAX_BINS: u32 = 2048;
/// Values below this collapse into the zero bucket.
pub const DEFAULT_MIN_VALUE: f64 = 1.0e-9;

#[derive(Debug)]
pub enum SummaryError {
    Encode(serde_json::Error),
    Decode(serde_json::Error),
    Merge(DDSketchError),
}

impl std::fmt::Display for SummaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryError::Encode(e) => write!(f, "failed to encode summary: {}", e),
            SummaryError::Decode(e) => write!(f, "failed to decode summary: {}", e),
            SummaryError::Merge(e) => write!(f, "failed to merge summaries: {}", e),
        }
    }
}

impl std::error::Error for SummaryError {}

/// A mergeable distribution estimate for one pipeline within one window.
///
/// Wraps `sketches_ddsketch::DDSketch`; merge order does not change the
/// resulting quantile estimates beyond the sketch's relative-error bound.
#[derive(Clone, Serialize, Deserialize)]
pub struct QuantileSummary {
    sketch: DDSketch,
}

impl QuantileSummary {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_ALPHA, DEFAULT_MAX_BINS, DEFAULT_MIN_VALUE)
    }

    pub fn with_config(alpha: f64, max_bins: u32, min_value: f64) -> Self {
        let config = SketchConfig::new(alpha, max_bins, min_value);
        Self {
            sketch: DDSketch::new(config),
        }
    }

    /// Record a single observed value.
    pub fn insert(&mut self, value: f64) {
        self.sketch.add(value);
    }

    /// Merge `other` into `self`.
    ///
    /// Fails only on structurally incompatible sketches (mismatched
    /// configuration); `self` is left untouched in that case.
    pub fn merge(&mut self, other: &QuantileSummary) -> Result<(), SummaryError> {
        self.sketch.merge(&other.sketch).map_err(SummaryError::Merge)
    }

    pub fn encode(&self) -> Result<Vec<u8>, SummaryError> {
        serde_json::to_vec(&self.sketch).map_err(SummaryError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SummaryError> {
        let sketch = serde_json::from_slice(bytes).map_err(SummaryError::Decode)?;
        Ok(Self { sketch })
    }

    pub fn count(&self) -> usize {
        self.sketch.count()
    }

    /// Estimated quantile, `q` in [0, 1]. `None` when the summary is empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        self.sketch.quantile(q).ok().flatten()
    }

    pub fn max(&self) -> Option<f64> {
        self.sketch.max()
    }
}

impl Default for QuantileSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QuantileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantileSummary")
            .field("count", &self.count())
            .finish()
    }
}
