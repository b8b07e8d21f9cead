use crate::{
    annotations::ViewFocus,
    errors::CoreError,
    models::{LatLng, Polygon, PolygonSummary},
    AppState,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// A polygon finished on the drawing surface. The returned polygon carries the
/// id the surface binds its layer to. If a window is active the new polygon is
/// classified in the background; its color arrives through the store snapshots.
pub async fn polygon_drawn(
    state: &AppState,
    vertices: Vec<[f64; 2]>,
    source_hint: Option<String>,
) -> Result<Polygon, CoreError> {
    let store = state.pipeline.store();
    let vertices: Vec<LatLng> = vertices.into_iter().map(|[lat, lng]| LatLng::new(lat, lng)).collect();

    let source = store
        .read(|store| store.resolve_source(source_hint.as_deref()))
        .await
        .ok_or_else(|| CoreError::Validation("no data sources configured".into()))?;

    let polygon = store.create(vertices, &source).await?;
    log_info!("polygon {} drawn with {} vertices ({})", polygon.id, polygon.vertices.len(), source);

    if state.pipeline.active_window().await.is_some() {
        let pipeline = state.pipeline.clone();
        let id = polygon.id;
        state.tasks.spawn(async move {
            if let Some(outcome) = pipeline.refresh_polygon(id).await {
                log_debug!("initial classification of {}: {:?}", id, outcome);
            }
        });
    }

    Ok(polygon)
}

/// Deletes the polygon currently shown at 1-based `ordinal`.
pub async fn delete_polygon(state: &AppState, ordinal: usize) -> Result<ViewFocus, CoreError> {
    let center = state.config.map_center();
    let removed = state
        .pipeline
        .store()
        .mutate(|store| {
            let id = store.resolve_ordinal(ordinal)?;
            store.remove(id)?;
            Ok::<_, CoreError>((id, store.view_focus(center)))
        })
        .await;

    let (id, focus) = removed?;
    log_info!("polygon {} deleted (was #{})", id, ordinal);
    Ok(focus)
}

pub async fn delete_all(state: &AppState) -> (usize, ViewFocus) {
    let removed = state.pipeline.store().remove_all().await;
    log_info!("cleared {} polygons", removed);
    (removed, ViewFocus::Center(state.config.map_center()))
}

pub async fn list_polygons(state: &AppState) -> (Vec<Polygon>, Vec<PolygonSummary>) {
    let store = state.pipeline.store();
    store
        .read(|store| (store.list().to_vec(), store.summaries()))
        .await
}

pub async fn reset_view(state: &AppState) -> ViewFocus {
    state
        .pipeline
        .store()
        .view_focus(state.config.map_center())
        .await
}
