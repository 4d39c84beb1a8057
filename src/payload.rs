//! Wire model for inbound client stats and outbound rollups
//!
//! Shapes mirror the transport contract: a client payload carries the
//! reporter identity plus one or more window observations, each holding
//! grouped per-pipeline entries with an opaque encoded summary. Summary
//! bytes travel hex-encoded so payloads stay line-oriented JSON.

use serde::{Deserialize, Serialize};

/// One per-pipeline entry inside a window observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientGroupedStats {
    pub pipeline_hash: u64,
    pub service: String,
    pub pipeline_name: String,
    #[serde(with = "hex_bytes")]
    pub summary: Vec<u8>,
}

/// One window observation reported by a client: start/duration in
/// nanoseconds since epoch, plus the grouped entries for that window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStatsBucket {
    pub start: u64,
    pub duration: u64,
    pub stats: Vec<ClientGroupedStats>,
}

/// A batch from one reporting client. The identity fields apply to every
/// bucket in the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStatsPayload {
    pub env: String,
    pub hostname: String,
    pub version: String,
    pub stats: Vec<ClientStatsBucket>,
}

/// Agent-level rollup emitted downstream once a window is flushed: the
/// per-key client payloads of that window wrapped with agent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsPayload {
    pub agent_env: String,
    pub agent_hostname: String,
    pub agent_version: String,
    pub stats: Vec<ClientStatsPayload>,
}

/// Hex string <-> byte vector serde adapter for summary bytes.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(serde::de::Error::custom)
    }
}
