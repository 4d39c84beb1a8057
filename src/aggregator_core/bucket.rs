//! Per-window aggregation state
//!
//! A `StatsBucket` holds every stats point observed for one time window,
//! keyed by reporter identity and then by pipeline hash. All mutation goes
//! through `add`, which enforces the per-entry failure isolation rules:
//! a corrupt or unmergeable entry is dropped without touching anything else.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::payload::{ClientGroupedStats, ClientStatsBucket, ClientStatsPayload};
use crate::summary::QuantileSummary;

/// Reporter identity within a window. Payloads with identical fields land
/// in the same group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    pub env: String,
    pub hostname: String,
    pub version: String,
}

/// Merged summary plus labels for one pipeline hash within one group.
///
/// Labels come from the first observation; later merges only add
/// statistical mass.
#[derive(Debug, Clone)]
pub struct StatsPoint {
    pub service: String,
    pub pipeline_name: String,
    pub summary: QuantileSummary,
}

/// Per-call accounting for `StatsBucket::add`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddOutcome {
    pub inserted: usize,
    pub merged: usize,
    pub decode_failures: usize,
    pub merge_failures: usize,
}

/// All stats points for one time window.
#[derive(Debug, Default)]
pub struct StatsBucket {
    stats: HashMap<AggregationKey, HashMap<u64, StatsPoint>>,
}

impl StatsBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one client-reported window observation into this bucket.
    ///
    /// Entries that fail to decode or merge are logged, counted and
    /// skipped; the rest of the observation still lands.
    pub fn add(
        &mut self,
        client_bucket: &ClientStatsBucket,
        env: &str,
        hostname: &str,
        version: &str,
    ) -> AddOutcome {
        let key = AggregationKey {
            env: env.to_string(),
            hostname: hostname.to_string(),
            version: version.to_string(),
        };
        let points = self.stats.entry(key).or_default();

        let mut outcome = AddOutcome::default();
        for entry in &client_bucket.stats {
            let summary = match QuantileSummary::decode(&entry.summary) {
                Ok(summary) => summary,
                Err(e) => {
                    log::error!(
                        "error decoding summary for pipeline {:#x}: {}",
                        entry.pipeline_hash,
                        e
                    );
                    outcome.decode_failures += 1;
                    continue;
                }
            };

            match points.entry(entry.pipeline_hash) {
                Entry::Occupied(mut point) => {
                    if let Err(e) = point.get_mut().summary.merge(&summary) {
                        log::error!(
                            "error merging summaries for pipeline {:#x}: {}",
                            entry.pipeline_hash,
                            e
                        );
                        outcome.merge_failures += 1;
                        continue;
                    }
                    outcome.merged += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(StatsPoint {
                        service: entry.service.clone(),
                        pipeline_name: entry.pipeline_name.clone(),
                        summary,
                    });
                    outcome.inserted += 1;
                }
            }
        }
        outcome
    }

    /// Build one export payload per non-empty group.
    ///
    /// Groups left empty by decode failures emit nothing. A point whose
    /// summary fails to re-encode is dropped from its group without
    /// affecting the rest.
    pub fn export(&self, start: u64, duration: u64) -> Vec<ClientStatsPayload> {
        let mut payloads = Vec::new();
        for (key, points) in &self.stats {
            let mut stats = Vec::with_capacity(points.len());
            for (hash, point) in points {
                let summary = match point.summary.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::error!("error serializing summary for pipeline {:#x}: {}", hash, e);
                        continue;
                    }
                };
                stats.push(ClientGroupedStats {
                    pipeline_hash: *hash,
                    service: point.service.clone(),
                    pipeline_name: point.pipeline_name.clone(),
                    summary,
                });
            }
            if stats.is_empty() {
                continue;
            }
            payloads.push(ClientStatsPayload {
                env: key.env.clone(),
                hostname: key.hostname.clone(),
                version: key.version.clone(),
                stats: vec![ClientStatsBucket {
                    start,
                    duration,
                    stats,
                }],
            });
        }
        payloads
    }

    /// Distinct `(key, pipeline_hash)` pairs in this bucket.
    pub fn point_count(&self) -> usize {
        self.stats.values().map(|points| points.len()).sum()
    }

    pub fn get_point(&self, key: &AggregationKey, pipeline_hash: u64) -> Option<&StatsPoint> {
        self.stats.get(key).and_then(|points| points.get(&pipeline_hash))
    }
}
