//! Single-consumer aggregation loop
//!
//! All bucket state lives inside one spawned worker. Producers submit
//! payloads into a bounded channel and the flush ticker fires once a second;
//! the worker multiplexes ingestion, ticks and the shutdown signal with
//! `tokio::select!`, so no locking is needed around the window map.
//!
//! Shutdown ordering: payloads queued before `stop` are folded in first,
//! then every open window (including the active one) is drained to the sink,
//! then the stop caller is released.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

use crate::payload::ClientStatsPayload;

use super::engine::Aggregator;
use super::sink::RollupSink;
use super::window;

/// Handle to a running aggregation worker.
///
/// Construction spawns the worker; `stop` shuts it down after a full drain.
pub struct StatsAggregator {
    in_tx: mpsc::Sender<ClientStatsPayload>,
    exit_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

impl StatsAggregator {
    /// Spawn the worker and return the handle. Must be called from within a
    /// tokio runtime.
    pub fn start(
        engine: Aggregator,
        sink: Box<dyn RollupSink>,
        flush_interval: Duration,
        channel_capacity: usize,
    ) -> Self {
        let (in_tx, in_rx) = mpsc::channel(channel_capacity);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(run_aggregation_loop(
            engine,
            sink,
            in_rx,
            exit_rx,
            done_tx,
            flush_interval,
            channel_capacity,
        ));

        Self {
            in_tx,
            exit_tx: Some(exit_tx),
            done_rx: Some(done_rx),
        }
    }

    /// Submit a client payload. Fire-and-forget: waits only for queue
    /// capacity, never for processing.
    pub async fn ingest(&self, payload: ClientStatsPayload) {
        if self.in_tx.send(payload).await.is_err() {
            log::error!("ingest channel closed, dropping client payload");
        }
    }

    /// Extra producer handle for sources that outlive this reference.
    pub fn sender(&self) -> mpsc::Sender<ClientStatsPayload> {
        self.in_tx.clone()
    }

    /// Stop the worker: queued payloads are processed, every open window is
    /// drained to the sink, then this returns.
    ///
    /// Calling `stop` twice panics.
    pub async fn stop(&mut self) {
        let exit_tx = self
            .exit_tx
            .take()
            .expect("StatsAggregator::stop called twice");
        let done_rx = self
            .done_rx
            .take()
            .expect("StatsAggregator::stop called twice");

        // worker may already be gone if the runtime is shutting down
        let _ = exit_tx.send(());
        let _ = done_rx.await;
    }
}

async fn run_aggregation_loop(
    mut engine: Aggregator,
    mut sink: Box<dyn RollupSink>,
    mut in_rx: mpsc::Receiver<ClientStatsPayload>,
    mut exit_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<()>,
    flush_interval: Duration,
    channel_capacity: usize,
) {
    log::info!(
        "starting aggregation loop (flush every {:?}, queue capacity {})",
        flush_interval,
        channel_capacity
    );
    let mut ticker = interval(flush_interval);

    loop {
        tokio::select! {
            Some(payload) = in_rx.recv() => {
                engine.ingest(payload);
            }

            _ = ticker.tick() => {
                let rollups = engine.flush_on_time(window::now_ns());
                if rollups.is_empty() {
                    continue;
                }
                let flushed = rollups.len();
                emit_rollups(&mut sink, rollups).await;

                let counters = engine.counters();
                log::info!(
                    "flushed {} window(s) | open: {} | queue: {}/{} | decode failures: {} | merge failures: {} | late dropped: {}",
                    flushed,
                    engine.open_window_count(),
                    in_rx.len(),
                    channel_capacity,
                    counters.decode_failures,
                    counters.merge_failures,
                    counters.late_dropped,
                );
            }

            _ = &mut exit_rx => {
                // fold in everything queued before the stop request
                while let Ok(payload) = in_rx.try_recv() {
                    engine.ingest(payload);
                }

                let rollups = engine.drain();
                let drained = rollups.len();
                emit_rollups(&mut sink, rollups).await;
                if let Err(e) = sink.flush().await {
                    log::error!("failed to flush {} sink on shutdown: {}", sink.sink_type(), e);
                }

                log::info!("aggregation loop drained {} window rollup(s), stopping", drained);
                if done_tx.send(()).is_err() {
                    log::warn!("stop caller went away before drain completed");
                }
                return;
            }
        }
    }
}

async fn emit_rollups(sink: &mut Box<dyn RollupSink>, rollups: Vec<crate::payload::StatsPayload>) {
    for rollup in rollups {
        if let Err(e) = sink.emit(rollup).await {
            log::error!("failed to emit rollup to {} sink: {}", sink.sink_type(), e);
        }
    }
}
