use serde::Serialize;

use crate::models::{LatLng, LatLngBounds, Polygon};

/// Where the map should look after the polygon set changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ViewFocus {
    /// Fit these bounds (the renderer adds its own padding).
    Fit(LatLngBounds),
    /// Nothing to fit; go back to the configured center.
    Center(LatLng),
}

impl ViewFocus {
    pub fn covering(polygons: &[Polygon], default_center: LatLng) -> Self {
        LatLngBounds::from_points(polygons.iter().flat_map(|p| p.vertices.iter()))
            .map(ViewFocus::Fit)
            .unwrap_or(ViewFocus::Center(default_center))
    }
}
