use crate::{errors::CoreError, models::TimeWindow, AppState};

use super::PendingRecompute;

/// The timeline produced a new `[start, end]` pair of hour stamps.
/// Validation happens here, before anything is scheduled. Spans longer than
/// the timeline range are rejected.
pub async fn window_changed(
    state: &AppState,
    start: &str,
    end: &str,
) -> Result<PendingRecompute, CoreError> {
    let window = TimeWindow::parse(start, end)?.limited_to(state.config.timeline_max_hours)?;
    Ok(schedule_window(state, window).await)
}

/// Slider positions, as hour offsets from the configured timeline base.
pub async fn timeline_moved(
    state: &AppState,
    start_hour: u32,
    end_hour: u32,
) -> Result<PendingRecompute, CoreError> {
    let base = state
        .config
        .timeline_base()
        .map_err(|err| CoreError::Validation(err.to_string()))?;
    let window =
        TimeWindow::from_hour_offsets(base, start_hour, end_hour, state.config.timeline_max_hours)?;
    Ok(schedule_window(state, window).await)
}

async fn schedule_window(state: &AppState, window: TimeWindow) -> PendingRecompute {
    let generation = state.pipeline.request_window(window).await;
    PendingRecompute::spawn(state, generation, window)
}
