use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome counts of one recompute pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassMetrics {
    pub timestamp: DateTime<Utc>,
    pub generation: u64,
    pub window: String,
    pub polygon_count: usize,
    pub updated: usize,
    pub failed: usize,
    pub removed: usize,
    pub superseded: bool,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub recent_passes: Vec<PassMetrics>,
    pub pass_count: u64,
    pub update_count: u64,
    pub failure_count: u64,
    pub superseded_count: u64,
    pub failures_by_kind: BTreeMap<String, u64>,
}
