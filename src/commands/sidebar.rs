use crate::{
    errors::CoreError,
    models::{Polygon, PolygonPatch, RulePatch, ThresholdRule},
    rules::RuleSet,
    AppState,
};

use super::PendingRecompute;

/// Changes the data source of the polygon currently shown at 1-based `ordinal`.
/// The ordinal is turned into an id once, under the same lock as the update.
pub async fn source_changed(
    state: &AppState,
    ordinal: usize,
    source: String,
) -> Result<Polygon, CoreError> {
    state
        .pipeline
        .store()
        .mutate(|store| {
            let id = store.resolve_ordinal(ordinal)?;
            store.update(id, PolygonPatch::source(source))
        })
        .await
}

/// Rule edits recolor the stored values in place and never refetch.
pub async fn rule_changed(
    state: &AppState,
    index: usize,
    rule: ThresholdRule,
) -> Result<RuleSet, CoreError> {
    state
        .pipeline
        .edit_rules(|rules| {
            rules.set_rule(index, rule)?;
            Ok(rules.clone())
        })
        .await
}

pub async fn rule_edited(
    state: &AppState,
    index: usize,
    patch: RulePatch,
) -> Result<RuleSet, CoreError> {
    state
        .pipeline
        .edit_rules(|rules| {
            rules.patch_rule(index, patch)?;
            Ok(rules.clone())
        })
        .await
}

/// Appends `rule`, or the configured template when none is given.
pub async fn rule_added(state: &AppState, rule: Option<ThresholdRule>) -> RuleSet {
    let rule = rule.unwrap_or_else(|| state.config.new_rule_template.clone());
    state
        .pipeline
        .with_rules_mut(|rules| {
            rules.add_rule(rule);
            rules.clone()
        })
        .await
}

pub async fn rule_removed(state: &AppState, index: usize) -> Result<RuleSet, CoreError> {
    state
        .pipeline
        .edit_rules(|rules| {
            rules.remove_rule(index)?;
            Ok(rules.clone())
        })
        .await
}

/// A new metric invalidates every stored value, so the active window is
/// fetched again.
pub async fn metric_changed(
    state: &AppState,
    metric: &str,
) -> Result<Option<PendingRecompute>, CoreError> {
    state.pipeline.set_metric(metric).await?;
    Ok(schedule_current(state).await)
}

async fn schedule_current(state: &AppState) -> Option<PendingRecompute> {
    let (generation, window) = state.pipeline.request_current().await?;
    Some(PendingRecompute::spawn(state, generation, window))
}
