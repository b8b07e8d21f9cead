//! Error types shared by the annotation store, the rule set and the aggregator.

use std::time::Duration;

use thiserror::Error;

use crate::models::PolygonId;

/// Addressing and validation failures. Surfaced to the adapter that issued the
/// request; the store and rule set are left untouched when one is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Malformed input such as too few vertices or an inverted window
    #[error("validation failed: {0}")]
    Validation(String),

    /// Polygon id is not (or no longer) in the store
    #[error("polygon {0} not found")]
    NotFound(PolygonId),

    /// Attempt to change a field that is fixed at creation
    #[error("polygon field '{0}' cannot be modified")]
    InvalidMutation(&'static str),

    /// Rule index outside `[0, len)`
    #[error("rule index {index} out of range (have {len} rules)")]
    IndexOutOfRange { index: usize, len: usize },

    /// 1-based list position outside `[1, len]`
    #[error("polygon #{ordinal} out of range (have {len} polygons)")]
    OrdinalOutOfRange { ordinal: usize, len: usize },
}

impl CoreError {
    /// Short machine-readable name, used in adapter responses.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::NotFound(_) => "notFound",
            CoreError::InvalidMutation(_) => "invalidMutation",
            CoreError::IndexOutOfRange { .. } => "indexOutOfRange",
            CoreError::OrdinalOutOfRange { .. } => "ordinalOutOfRange",
        }
    }
}

/// Why a polygon's representative value could not be computed for a window.
/// Never escapes the classification pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("time-series endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed series: {0}")]
    Parse(String),

    #[error("no data points inside the window")]
    NoData,

    /// The readings were finite but their mean overflowed
    #[error("window mean is not a finite number")]
    NonFinite,

    #[error("aggregation timed out after {0:?}")]
    Timeout(Duration),

    /// The spawned aggregation task panicked or was aborted
    #[error("aggregation task failed: {0}")]
    Task(String),

    /// The value was computed but the store refused to record it
    #[error("store rejected the result: {0}")]
    Rejected(CoreError),
}

impl AggregationError {
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationError::Network(_) => "network",
            AggregationError::Status(_) => "status",
            AggregationError::Parse(_) => "parse",
            AggregationError::NoData => "noData",
            AggregationError::NonFinite => "nonFinite",
            AggregationError::Timeout(_) => "timeout",
            AggregationError::Task(_) => "task",
            AggregationError::Rejected(_) => "rejected",
        }
    }
}

impl From<reqwest::Error> for AggregationError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            AggregationError::Status(status.as_u16())
        } else if err.is_decode() {
            AggregationError::Parse(err.to_string())
        } else {
            AggregationError::Network(err.to_string())
        }
    }
}
