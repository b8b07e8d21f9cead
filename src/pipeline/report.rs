use serde::{Serialize, Serializer};

use crate::errors::AggregationError;
use crate::models::{PolygonId, TimeWindow};

/// What happened to one polygon during a recompute pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PolygonOutcome {
    /// New value and color were written to the store.
    Updated {
        id: PolygonId,
        value: f64,
        color: String,
    },
    /// Aggregation failed; the previous classification was kept.
    Failed {
        id: PolygonId,
        #[serde(serialize_with = "serialize_error")]
        error: AggregationError,
    },
    /// A newer window was requested before this result arrived.
    Discarded { id: PolygonId },
    /// The polygon was deleted while its aggregation was in flight.
    Removed { id: PolygonId },
}

impl PolygonOutcome {
    pub fn id(&self) -> PolygonId {
        match self {
            PolygonOutcome::Updated { id, .. }
            | PolygonOutcome::Failed { id, .. }
            | PolygonOutcome::Discarded { id }
            | PolygonOutcome::Removed { id } => *id,
        }
    }
}

fn serialize_error<S: Serializer>(error: &AggregationError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeReport {
    pub generation: u64,
    pub window: TimeWindow,
    pub superseded: bool,
    pub outcomes: Vec<PolygonOutcome>,
}

impl RecomputeReport {
    pub fn outcome_for(&self, id: PolygonId) -> Option<&PolygonOutcome> {
        self.outcomes.iter().find(|outcome| outcome.id() == id)
    }

    pub fn updated_count(&self) -> usize {
        self.count(|o| matches!(o, PolygonOutcome::Updated { .. }))
    }

    pub fn removed_count(&self) -> usize {
        self.count(|o| matches!(o, PolygonOutcome::Removed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = (PolygonId, &AggregationError)> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            PolygonOutcome::Failed { id, error } => Some((*id, error)),
            _ => None,
        })
    }

    fn count(&self, predicate: impl Fn(&PolygonOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(o)).count()
    }
}
