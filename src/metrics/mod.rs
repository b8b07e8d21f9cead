mod types;

pub use types::{MetricsSnapshot, PassMetrics};

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_RECENT_PASSES: usize = 20;

/// Running tally of recompute passes, kept so aggregation failures are visible
/// somewhere other than the log.
pub struct PipelineMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_passes: Vec<PassMetrics>,
    pass_count: u64,
    update_count: u64,
    failure_count: u64,
    superseded_count: u64,
    failures_by_kind: BTreeMap<String, u64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_passes: Vec::with_capacity(MAX_RECENT_PASSES),
                ..MetricsState::default()
            })),
        }
    }

    pub async fn record_pass(&self, pass: PassMetrics, failure_kinds: &[&'static str]) {
        let mut state = self.inner.lock().await;

        state.pass_count += 1;
        state.update_count += pass.updated as u64;
        state.failure_count += failure_kinds.len() as u64;
        if pass.superseded {
            state.superseded_count += 1;
        }
        for kind in failure_kinds {
            *state.failures_by_kind.entry((*kind).to_string()).or_insert(0) += 1;
        }

        state.recent_passes.push(pass);

        if state.recent_passes.len() > MAX_RECENT_PASSES {
            state.recent_passes.remove(0);
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;

        MetricsSnapshot {
            recent_passes: state.recent_passes.clone(),
            pass_count: state.pass_count,
            update_count: state.update_count,
            failure_count: state.failure_count,
            superseded_count: state.superseded_count,
            failures_by_kind: state.failures_by_kind.clone(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PipelineMetrics {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
