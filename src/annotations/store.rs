use chrono::Utc;

use crate::errors::CoreError;
use crate::models::{
    ring_centroid, LatLng, Polygon, PolygonId, PolygonPatch, PolygonSummary, MIN_POLYGON_VERTICES,
};

use super::view::ViewFocus;

/// Owns every polygon and its metadata, in insertion order.
///
/// Every mutating call validates the whole request before touching state, so a
/// failed call leaves the store exactly as it was. `revision` increases on each
/// successful mutation and lets the rendering side skip redundant repaints.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    polygons: Vec<Polygon>,
    next_id: u64,
    revision: u64,
    known_sources: Vec<String>,
    fallback_color: String,
}

impl AnnotationStore {
    pub fn new(known_sources: Vec<String>, fallback_color: impl Into<String>) -> Self {
        Self {
            polygons: Vec::new(),
            next_id: 1,
            revision: 0,
            known_sources,
            fallback_color: fallback_color.into(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn known_sources(&self) -> &[String] {
        &self.known_sources
    }

    pub fn fallback_color(&self) -> &str {
        &self.fallback_color
    }

    /// Source used when the drawing surface gives no usable hint.
    pub fn default_source(&self) -> Option<&str> {
        self.known_sources.first().map(String::as_str)
    }

    /// Picks `hint` when it names a known source, the default source otherwise.
    pub fn resolve_source(&self, hint: Option<&str>) -> Option<String> {
        hint.map(str::trim)
            .filter(|hint| self.is_known_source(hint))
            .or_else(|| self.default_source())
            .map(str::to_owned)
    }

    pub fn is_known_source(&self, source: &str) -> bool {
        self.known_sources.iter().any(|known| known == source)
    }

    pub fn create(&mut self, vertices: Vec<LatLng>, source: &str) -> Result<Polygon, CoreError> {
        if vertices.len() < MIN_POLYGON_VERTICES {
            return Err(CoreError::Validation(format!(
                "polygon needs at least {MIN_POLYGON_VERTICES} vertices, got {}",
                vertices.len()
            )));
        }
        if let Some(bad) = vertices.iter().find(|p| !p.is_finite()) {
            return Err(CoreError::Validation(format!(
                "vertex ({}, {}) is not a finite coordinate",
                bad.lat, bad.lng
            )));
        }
        self.check_source(source)?;

        let centroid = ring_centroid(&vertices)
            .ok_or_else(|| CoreError::Validation("polygon has no vertices".into()))?;

        let id = PolygonId(self.next_id);
        self.next_id += 1;

        let polygon = Polygon {
            id,
            vertices,
            source: source.to_owned(),
            centroid,
            representative_value: None,
            applied_color: self.fallback_color.clone(),
            created_at: Utc::now(),
            window_timestamp: None,
        };

        self.polygons.push(polygon.clone());
        self.revision += 1;
        Ok(polygon)
    }

    pub fn update(&mut self, id: PolygonId, patch: PolygonPatch) -> Result<Polygon, CoreError> {
        if let Some(field) = patch.immutable_field() {
            return Err(CoreError::InvalidMutation(field));
        }
        if let Some(source) = patch.source.as_deref() {
            self.check_source(source)?;
        }
        if let Some(value) = patch.representative_value {
            if !value.is_finite() {
                return Err(CoreError::Validation(format!(
                    "representative value {value} is not finite"
                )));
            }
        }

        let polygon = self
            .polygons
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(CoreError::NotFound(id))?;

        if let Some(source) = patch.source {
            polygon.source = source;
        }
        if let Some(value) = patch.representative_value {
            polygon.representative_value = Some(value);
        }
        if let Some(color) = patch.applied_color {
            polygon.applied_color = color;
        }
        if let Some(window_start) = patch.window_timestamp {
            polygon.window_timestamp = Some(window_start);
        }

        let updated = polygon.clone();
        self.revision += 1;
        Ok(updated)
    }

    /// Removes one polygon. Unknown ids are reported as `NotFound`, same as `update`.
    pub fn remove(&mut self, id: PolygonId) -> Result<Polygon, CoreError> {
        let position = self
            .polygons
            .iter()
            .position(|p| p.id == id)
            .ok_or(CoreError::NotFound(id))?;

        let removed = self.polygons.remove(position);
        self.revision += 1;
        Ok(removed)
    }

    /// Clears the store and returns how many polygons were dropped. Ids keep counting up.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.polygons.len();
        self.polygons.clear();
        self.revision += 1;
        removed
    }

    pub fn list(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn get(&self, id: PolygonId) -> Option<&Polygon> {
        self.polygons.iter().find(|p| p.id == id)
    }

    /// Maps a 1-based list position to the id sitting there right now.
    /// Callers must act on the returned id, never keep the ordinal around.
    pub fn resolve_ordinal(&self, ordinal: usize) -> Result<PolygonId, CoreError> {
        ordinal
            .checked_sub(1)
            .and_then(|index| self.polygons.get(index))
            .map(|p| p.id)
            .ok_or(CoreError::OrdinalOutOfRange {
                ordinal,
                len: self.polygons.len(),
            })
    }

    pub fn summaries(&self) -> Vec<PolygonSummary> {
        self.polygons
            .iter()
            .enumerate()
            .map(|(index, polygon)| PolygonSummary {
                ordinal: index + 1,
                id: polygon.id,
                label: format!("{}. {}", index + 1, polygon.source),
                applied_color: polygon.applied_color.clone(),
                representative_value: polygon.representative_value,
            })
            .collect()
    }

    pub fn view_focus(&self, default_center: LatLng) -> ViewFocus {
        ViewFocus::covering(&self.polygons, default_center)
    }

    fn check_source(&self, source: &str) -> Result<(), CoreError> {
        if self.is_known_source(source) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "unknown data source '{source}' (expected one of: {})",
                self.known_sources.join(", ")
            )))
        }
    }
}
