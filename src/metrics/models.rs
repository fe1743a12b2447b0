//! Status record types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::metrics::MetricParseError;
use crate::targets::Target;

/// Absolute counters and the per-second rates derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub current_connections: u64,
    pub connections: u64,
    pub connections_per_second: f64,
    pub aborted_connections: u64,
    pub aborted_connections_per_second: f64,
    pub queries: u64,
    pub queries_per_second: f64,
    pub reads: u64,
    pub reads_per_second: f64,
    pub writes: u64,
    pub writes_per_second: f64,
    pub uptime: u64,
}

/// Configuration facts read from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Variables {
    pub max_connections: u64,
}

/// Running totals carried from one poll cycle to the next.
///
/// `None` means the counter has never been observed for this target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulators {
    pub connections: Option<u64>,
    pub aborted_connections: Option<u64>,
    pub queries: Option<u64>,
    pub reads: Option<u64>,
    pub writes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMetadata {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub collected_at: DateTime<Utc>,
}

/// The published status of one target for one poll cycle.
///
/// Snapshots are never edited after construction; a newer cycle replaces
/// the whole value in the store.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub metrics: Metrics,
    pub variables: Variables,
    #[serde(skip)]
    pub accumulators: Accumulators,
    /// Monotonic instant the readings were taken, used to scale the next diff.
    #[serde(skip)]
    pub observed_at: Instant,
    /// Counters that failed to parse in this cycle.
    #[serde(skip)]
    pub parse_errors: Vec<MetricParseError>,
}

impl Snapshot {
    pub fn new(
        target: &Target,
        metrics: Metrics,
        variables: Variables,
        accumulators: Accumulators,
        observed_at: Instant,
    ) -> Self {
        Self {
            metadata: SnapshotMetadata {
                name: target.name.clone(),
                host: target.host.clone(),
                port: target.port,
                collected_at: Utc::now(),
            },
            metrics,
            variables,
            accumulators,
            observed_at,
            parse_errors: Vec::new(),
        }
    }

    pub fn with_parse_errors(mut self, errors: Vec<MetricParseError>) -> Self {
        self.parse_errors = errors;
        self
    }

    /// Whether this snapshot was taken from the server `target` points at.
    ///
    /// A hot reload may repoint a name at a different server, whose counters
    /// must not be diffed against the old one.
    pub fn describes(&self, target: &Target) -> bool {
        self.metadata.name == target.name
            && self.metadata.host == target.host
            && self.metadata.port == target.port
    }
}
