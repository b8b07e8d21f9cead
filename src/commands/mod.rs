//! Typed ingress for the drawing, timeline and sidebar adapters.
//!
//! Each adapter talks to the core only through the functions in its submodule
//! (or through [`dispatch`] with a serialized [`Command`]). Addressing and
//! validation failures come back as [`CoreError`]; aggregation failures never
//! do, they end up in the recompute report and the pipeline metrics.

pub mod drawing;
pub mod sidebar;
pub mod timeline;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{
    annotations::ViewFocus,
    errors::CoreError,
    metrics::MetricsSnapshot,
    models::{Polygon, PolygonSummary, RulePatch, ThresholdRule, TimeWindow},
    pipeline::RecomputeReport,
    rules::RuleSet,
    AppState,
};

/// A recompute that was requested synchronously and is running in the background.
pub struct PendingRecompute {
    pub generation: u64,
    pub window: TimeWindow,
    pub handle: JoinHandle<RecomputeReport>,
}

impl PendingRecompute {
    pub(crate) fn spawn(state: &AppState, generation: u64, window: TimeWindow) -> Self {
        let pipeline = state.pipeline.clone();
        let handle = state
            .tasks
            .spawn(async move { pipeline.recompute_generation(generation, window).await });
        Self {
            generation,
            window,
            handle,
        }
    }

    pub fn scheduled(&self) -> Scheduled {
        Scheduled {
            generation: self.generation,
            window: self.window,
        }
    }
}

/// Serializable view of a [`PendingRecompute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduled {
    pub generation: u64,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    PolygonDrawn {
        vertices: Vec<[f64; 2]>,
        #[serde(default)]
        source_hint: Option<String>,
    },
    DeletePolygon {
        ordinal: usize,
    },
    DeleteAll,
    ListPolygons,
    ResetView,
    WindowChanged {
        start: String,
        end: String,
    },
    TimelineMoved {
        start_hour: u32,
        end_hour: u32,
    },
    SourceChanged {
        ordinal: usize,
        source: String,
    },
    RuleChanged {
        index: usize,
        rule: ThresholdRule,
    },
    RuleEdited {
        index: usize,
        patch: RulePatch,
    },
    RuleAdded {
        #[serde(default)]
        rule: Option<ThresholdRule>,
    },
    RuleRemoved {
        index: usize,
    },
    ListRules,
    MetricChanged {
        metric: String,
    },
    Metrics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Response {
    Polygon {
        polygon: Polygon,
    },
    Polygons {
        polygons: Vec<Polygon>,
        summaries: Vec<PolygonSummary>,
    },
    Deleted {
        removed: usize,
        focus: ViewFocus,
    },
    View {
        focus: ViewFocus,
    },
    WindowRequested {
        scheduled: Scheduled,
    },
    Rules {
        rules: RuleSet,
    },
    MetricSet {
        metric: String,
        scheduled: Option<Scheduled>,
    },
    Metrics {
        metrics: MetricsSnapshot,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl From<CoreError> for Response {
    fn from(err: CoreError) -> Self {
        Response::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Routes one adapter command. Background recomputes keep running after this
/// returns; their results reach the renderer through the store snapshots.
pub async fn dispatch(state: &AppState, command: Command) -> Response {
    let result: Result<Response, CoreError> = match command {
        Command::PolygonDrawn {
            vertices,
            source_hint,
        } => drawing::polygon_drawn(state, vertices, source_hint)
            .await
            .map(|polygon| Response::Polygon { polygon }),
        Command::DeletePolygon { ordinal } => drawing::delete_polygon(state, ordinal)
            .await
            .map(|focus| Response::Deleted { removed: 1, focus }),
        Command::DeleteAll => {
            let (removed, focus) = drawing::delete_all(state).await;
            Ok(Response::Deleted { removed, focus })
        }
        Command::ListPolygons => {
            let (polygons, summaries) = drawing::list_polygons(state).await;
            Ok(Response::Polygons {
                polygons,
                summaries,
            })
        }
        Command::ResetView => Ok(Response::View {
            focus: drawing::reset_view(state).await,
        }),
        Command::WindowChanged { start, end } => timeline::window_changed(state, &start, &end)
            .await
            .map(|pending| Response::WindowRequested {
                scheduled: pending.scheduled(),
            }),
        Command::TimelineMoved {
            start_hour,
            end_hour,
        } => timeline::timeline_moved(state, start_hour, end_hour)
            .await
            .map(|pending| Response::WindowRequested {
                scheduled: pending.scheduled(),
            }),
        Command::SourceChanged { ordinal, source } => {
            sidebar::source_changed(state, ordinal, source)
                .await
                .map(|polygon| Response::Polygon { polygon })
        }
        Command::RuleChanged { index, rule } => sidebar::rule_changed(state, index, rule)
            .await
            .map(|rules| Response::Rules { rules }),
        Command::RuleEdited { index, patch } => sidebar::rule_edited(state, index, patch)
            .await
            .map(|rules| Response::Rules { rules }),
        Command::RuleAdded { rule } => Ok(Response::Rules {
            rules: sidebar::rule_added(state, rule).await,
        }),
        Command::RuleRemoved { index } => sidebar::rule_removed(state, index)
            .await
            .map(|rules| Response::Rules { rules }),
        Command::ListRules => Ok(Response::Rules {
            rules: state.pipeline.rules().await,
        }),
        Command::MetricChanged { metric } => sidebar::metric_changed(state, &metric)
            .await
            .map(|pending| Response::MetricSet {
                metric: metric.trim().to_string(),
                scheduled: pending.as_ref().map(PendingRecompute::scheduled),
            }),
        Command::Metrics => Ok(Response::Metrics {
            metrics: state.pipeline.metrics().get_snapshot().await,
        }),
    };

    result.unwrap_or_else(Response::from)
}
