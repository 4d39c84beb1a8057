//! statflow agent binary
//!
//! Tails a JSONL stream of client stats payloads, aggregates them into
//! 10-second windows, and appends completed rollups to a JSONL output file.
//!
//! ## Environment Variables
//!
//! - STATFLOW_ENV - environment tag stamped on rollups (default: none)
//! - STATFLOW_HOSTNAME - hostname stamped on rollups (default: $HOSTNAME)
//! - BUCKET_WINDOW_SECS - aggregation window width (default: 10)
//! - FLUSH_INTERVAL_SECS - elapsed-window check cadence (default: 1)
//! - INGEST_CHANNEL_CAPACITY - ingest queue bound (default: 10)
//! - INPUT_STREAM_PATH - inbound payload stream (default: streams/client_stats.jsonl)
//! - ROLLUP_OUTPUT_PATH - rollup output file (default: streams/rollups.jsonl)
//! - RUST_LOG - logging level (optional, default: info)

use statflow::aggregator_core::{Aggregator, JsonlRollupSink, StatsAggregator};
use statflow::config::AgentConfig;
use statflow::reader::PayloadTailReader;
use statflow::AGENT_VERSION;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = AgentConfig::from_env()?;

    log::info!("starting statflow agent v{}", AGENT_VERSION);
    log::info!("   env: {}", config.agent_env);
    log::info!("   hostname: {}", config.agent_hostname);
    log::info!("   window: {:?}", config.bucket_window);
    log::info!("   flush interval: {:?}", config.flush_interval);
    log::info!("   input: {}", config.input_stream_path.display());
    log::info!("   output: {}", config.rollup_output_path.display());

    let sink = JsonlRollupSink::new(config.rollup_output_path.clone())?;
    let engine = Aggregator::new(
        config.agent_env.clone(),
        config.agent_hostname.clone(),
        config.bucket_window,
    );
    let mut aggregator = StatsAggregator::start(
        engine,
        Box::new(sink),
        config.flush_interval,
        config.channel_capacity,
    );

    let mut reader = PayloadTailReader::new(config.input_stream_path.clone());
    reader.start().await?;

    loop {
        tokio::select! {
            result = reader.next_payload() => match result {
                Ok(payload) => aggregator.ingest(payload).await,
                Err(e) => {
                    log::error!("input stream error, shutting down: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutdown requested");
                break;
            }
        }
    }

    // drains every open window, including the active one
    aggregator.stop().await;
    log::info!("statflow agent stopped");
    Ok(())
}
