use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LatLng;

/// Minimum number of vertices for a drawable polygon.
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Stable polygon handle. Issued by the store from a monotonic counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolygonId(pub u64);

impl fmt::Display for PolygonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Polygon {
    pub id: PolygonId,
    pub vertices: Vec<LatLng>,
    pub source: String,
    pub centroid: LatLng,
    pub representative_value: Option<f64>,
    pub applied_color: String,
    pub created_at: DateTime<Utc>,
    /// Start of the window the current value was computed for.
    pub window_timestamp: Option<NaiveDateTime>,
}

/// Partial update accepted by `AnnotationStore::update`.
///
/// `id`, `vertices` and `centroid` are present only so that attempts to change
/// them can be rejected explicitly instead of being silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolygonPatch {
    pub source: Option<String>,
    pub representative_value: Option<f64>,
    pub applied_color: Option<String>,
    pub window_timestamp: Option<NaiveDateTime>,
    pub id: Option<PolygonId>,
    pub vertices: Option<Vec<LatLng>>,
    pub centroid: Option<LatLng>,
}

impl PolygonPatch {
    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    pub fn color(color: impl Into<String>) -> Self {
        Self {
            applied_color: Some(color.into()),
            ..Self::default()
        }
    }

    /// Patch carrying the result of one classification pass.
    pub fn classification(value: f64, color: impl Into<String>, window_start: NaiveDateTime) -> Self {
        Self {
            representative_value: Some(value),
            applied_color: Some(color.into()),
            window_timestamp: Some(window_start),
            ..Self::default()
        }
    }

    pub fn immutable_field(&self) -> Option<&'static str> {
        if self.id.is_some() {
            Some("id")
        } else if self.vertices.is_some() {
            Some("vertices")
        } else if self.centroid.is_some() {
            Some("centroid")
        } else {
            None
        }
    }
}

/// One line of the "view all" listing, 1-based like the prompts shown to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonSummary {
    pub ordinal: usize,
    pub id: PolygonId,
    pub label: String,
    pub applied_color: String,
    pub representative_value: Option<f64>,
}
