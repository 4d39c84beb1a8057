//! Aggregation engine: open-window bookkeeping and flush decisions
//!
//! The engine is purely synchronous and single-owner; the ingestion loop in
//! `ingestion.rs` is the only caller. It routes client observations into
//! per-window buckets, decides which windows have elapsed on each tick, and
//! produces one rollup payload per flushed window.

use std::collections::HashMap;
use std::time::Duration;

use crate::payload::{ClientStatsPayload, StatsPayload};
use crate::AGENT_VERSION;

use super::bucket::StatsBucket;
use super::window;

/// Cumulative per-entry failure accounting, reported in flush logs.
/// Decode and merge failures are tracked separately.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregationCounters {
    pub decode_failures: u64,
    pub merge_failures: u64,
    pub late_dropped: u64,
}

/// Owns all open window buckets. Windows at or past the flush watermark are
/// closed; late data for them is dropped and counted rather than re-opening
/// an already-exported window.
pub struct Aggregator {
    buckets: HashMap<u64, StatsBucket>,
    bucket_duration_ns: u64,
    flush_watermark_ns: u64,
    counters: AggregationCounters,
    agent_env: String,
    agent_hostname: String,
}

impl Aggregator {
    pub fn new(agent_env: String, agent_hostname: String, bucket_duration: Duration) -> Self {
        Self {
            buckets: HashMap::with_capacity(20),
            bucket_duration_ns: bucket_duration.as_nanos() as u64,
            flush_watermark_ns: 0,
            counters: AggregationCounters::default(),
            agent_env,
            agent_hostname,
        }
    }

    /// Route every observation in the payload into its window's bucket.
    ///
    /// Observations for windows that ended at or before the watermark are
    /// dropped and counted: those windows have already been exported.
    pub fn ingest(&mut self, payload: ClientStatsPayload) {
        for client_bucket in &payload.stats {
            let start = window::align_timestamp(client_bucket.start, self.bucket_duration_ns);
            if start < self.flush_watermark_ns {
                self.counters.late_dropped += 1;
                log::debug!(
                    "dropping late bucket for window {} (flush watermark {})",
                    start,
                    self.flush_watermark_ns
                );
                continue;
            }
            let bucket = self.buckets.entry(start).or_default();
            let outcome = bucket.add(
                client_bucket,
                &payload.env,
                &payload.hostname,
                &payload.version,
            );
            self.counters.decode_failures += outcome.decode_failures as u64;
            self.counters.merge_failures += outcome.merge_failures as u64;
        }
    }

    /// Export and close every window that elapsed before `now_ns`.
    ///
    /// The currently active window never elapses by this rule and keeps
    /// accepting merges.
    pub fn flush_on_time(&mut self, now_ns: u64) -> Vec<StatsPayload> {
        let elapsed: Vec<u64> = self
            .buckets
            .keys()
            .copied()
            .filter(|&start| window::has_elapsed(start, self.bucket_duration_ns, now_ns))
            .collect();
        self.flush_windows(elapsed)
    }

    /// Export and close every open window, including the active one.
    /// Shutdown only.
    pub fn drain(&mut self) -> Vec<StatsPayload> {
        let all: Vec<u64> = self.buckets.keys().copied().collect();
        self.flush_windows(all)
    }

    fn flush_windows(&mut self, starts: Vec<u64>) -> Vec<StatsPayload> {
        let mut rollups = Vec::new();
        for start in starts {
            if let Some(bucket) = self.buckets.remove(&start) {
                let window_end = start + self.bucket_duration_ns;
                self.flush_watermark_ns = self.flush_watermark_ns.max(window_end);
                if let Some(rollup) = self.export(start, &bucket) {
                    rollups.push(rollup);
                }
            }
        }
        rollups
    }

    fn export(&self, start: u64, bucket: &StatsBucket) -> Option<StatsPayload> {
        let stats = bucket.export(start, self.bucket_duration_ns);
        if stats.is_empty() {
            log::debug!("window {} has no exportable groups, nothing emitted", start);
            return None;
        }
        Some(StatsPayload {
            agent_env: self.agent_env.clone(),
            agent_hostname: self.agent_hostname.clone(),
            agent_version: AGENT_VERSION.to_string(),
            stats,
        })
    }

    pub fn counters(&self) -> AggregationCounters {
        self.counters
    }

    pub fn open_window_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ClientGroupedStats, ClientStatsBucket};
    use crate::summary::QuantileSummary;

    const BUCKET_NS: u64 = 10_000_000_000;
    const WINDOW_T: u64 = 1_700_000_000_000_000_000; // multiple of 10s in ns

    fn engine() -> Aggregator {
        Aggregator::new(
            "agent-env".to_string(),
            "agent-host".to_string(),
            Duration::from_secs(10),
        )
    }

    fn encoded_summary(values: &[f64]) -> Vec<u8> {
        let mut summary = QuantileSummary::new();
        for &v in values {
            summary.insert(v);
        }
        summary.encode().unwrap()
    }

    fn payload(start: u64, hash: u64, summary: Vec<u8>) -> ClientStatsPayload {
        ClientStatsPayload {
            env: "prod".to_string(),
            hostname: "h1".to_string(),
            version: "v1".to_string(),
            stats: vec![ClientStatsBucket {
                start,
                duration: BUCKET_NS,
                stats: vec![ClientGroupedStats {
                    pipeline_hash: hash,
                    service: "svc".to_string(),
                    pipeline_name: "p".to_string(),
                    summary,
                }],
            }],
        }
    }

    fn decode_single_summary(rollup: &StatsPayload, hash: u64) -> QuantileSummary {
        let entry = rollup.stats[0].stats[0]
            .stats
            .iter()
            .find(|s| s.pipeline_hash == hash)
            .expect("pipeline hash missing from rollup");
        QuantileSummary::decode(&entry.summary).unwrap()
    }

    #[test]
    fn test_flush_before_window_elapses_emits_nothing() {
        let mut agg = engine();
        agg.ingest(payload(WINDOW_T, 42, encoded_summary(&[1.0])));

        let rollups = agg.flush_on_time(WINDOW_T + BUCKET_NS);
        assert!(rollups.is_empty());
        assert_eq!(agg.open_window_count(), 1);
    }

    #[test]
    fn test_flush_after_window_elapses_emits_one_rollup() {
        let mut agg = engine();
        agg.ingest(payload(WINDOW_T + 3, 42, encoded_summary(&[1.0, 2.0, 3.0])));

        // 10.001s past the window start
        let rollups = agg.flush_on_time(WINDOW_T + BUCKET_NS + 1_000_000);
        assert_eq!(rollups.len(), 1);
        assert_eq!(agg.open_window_count(), 0);

        let rollup = &rollups[0];
        assert_eq!(rollup.agent_env, "agent-env");
        assert_eq!(rollup.agent_hostname, "agent-host");
        assert_eq!(rollup.agent_version, crate::AGENT_VERSION);
        assert_eq!(rollup.stats[0].stats[0].start, WINDOW_T);
        assert_eq!(rollup.stats[0].stats[0].duration, BUCKET_NS);

        let summary = decode_single_summary(rollup, 42);
        let median = summary.quantile(0.5).unwrap();
        assert!((median - 2.0).abs() < 0.05, "median {} too far from 2", median);
    }

    #[test]
    fn test_same_window_batches_merge_into_one_point() {
        let mut agg = engine();
        agg.ingest(payload(WINDOW_T, 42, encoded_summary(&[1.0, 2.0, 3.0])));
        agg.ingest(payload(WINDOW_T + 5_000_000_000, 42, encoded_summary(&[4.0, 5.0, 6.0])));

        let rollups = agg.flush_on_time(WINDOW_T + 2 * BUCKET_NS);
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].stats[0].stats[0].stats.len(), 1);

        let summary = decode_single_summary(&rollups[0], 42);
        assert_eq!(summary.count(), 6);
        let max = summary.max().unwrap();
        assert!((max - 6.0).abs() / 6.0 < 0.02, "max {} too far from 6", max);
    }

    #[test]
    fn test_out_of_order_reports_land_in_their_window() {
        let mut agg = engine();
        // late-received but its window is still open
        agg.ingest(payload(WINDOW_T + BUCKET_NS, 1, encoded_summary(&[1.0])));
        agg.ingest(payload(WINDOW_T, 2, encoded_summary(&[2.0])));

        assert_eq!(agg.open_window_count(), 2);
        let rollups = agg.flush_on_time(WINDOW_T + BUCKET_NS + 1);
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].stats[0].stats[0].stats[0].pipeline_hash, 2);
        assert_eq!(agg.open_window_count(), 1);
    }

    #[test]
    fn test_late_data_for_flushed_window_is_dropped_and_counted() {
        let mut agg = engine();
        agg.ingest(payload(WINDOW_T, 1, encoded_summary(&[1.0])));
        let flushed = agg.flush_on_time(WINDOW_T + BUCKET_NS + 1);
        assert_eq!(flushed.len(), 1);

        agg.ingest(payload(WINDOW_T + 2, 1, encoded_summary(&[9.0])));

        assert_eq!(agg.open_window_count(), 0);
        assert_eq!(agg.counters().late_dropped, 1);
    }

    #[test]
    fn test_drain_exports_everything_and_skips_empty_windows() {
        let mut agg = engine();
        // one window emptied entirely by decode failures
        agg.ingest(payload(WINDOW_T, 1, b"garbage".to_vec()));
        // one healthy window, still active
        agg.ingest(payload(WINDOW_T + BUCKET_NS, 2, encoded_summary(&[5.0])));

        assert_eq!(agg.open_window_count(), 2);
        let rollups = agg.drain();

        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].stats[0].stats[0].stats[0].pipeline_hash, 2);
        assert_eq!(agg.open_window_count(), 0);
        assert_eq!(agg.counters().decode_failures, 1);
    }

    #[test]
    fn test_decode_and_merge_failures_counted_separately() {
        let mut agg = engine();
        agg.ingest(payload(WINDOW_T, 1, encoded_summary(&[1.0])));

        let mut incompatible = QuantileSummary::with_config(0.05, 512, 1.0e-9);
        incompatible.insert(2.0);
        agg.ingest(payload(WINDOW_T, 1, incompatible.encode().unwrap()));
        agg.ingest(payload(WINDOW_T, 2, b"garbage".to_vec()));

        let counters = agg.counters();
        assert_eq!(counters.merge_failures, 1);
        assert_eq!(counters.decode_failures, 1);
    }

    #[test]
    fn test_merge_commutativity_across_batches() {
        let first = encoded_summary(&[1.0, 5.0, 9.0]);
        let second = encoded_summary(&[2.0, 4.0, 100.0]);

        let mut forward = engine();
        forward.ingest(payload(WINDOW_T, 42, first.clone()));
        forward.ingest(payload(WINDOW_T, 42, second.clone()));

        let mut reverse = engine();
        reverse.ingest(payload(WINDOW_T, 42, second));
        reverse.ingest(payload(WINDOW_T, 42, first));

        let f = forward.flush_on_time(WINDOW_T + 2 * BUCKET_NS);
        let r = reverse.flush_on_time(WINDOW_T + 2 * BUCKET_NS);

        let fs = decode_single_summary(&f[0], 42);
        let rs = decode_single_summary(&r[0], 42);
        for q in [0.25, 0.5, 0.75, 0.95] {
            let lhs = fs.quantile(q).unwrap();
            let rhs = rs.quantile(q).unwrap();
            assert!(
                (lhs - rhs).abs() <= 1e-9 + 0.02 * lhs.abs(),
                "q{}: {} vs {}",
                q,
                lhs,
                rhs
            );
        }
    }
}
