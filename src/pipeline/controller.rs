use std::{sync::Arc, time::Instant};

use chrono::Utc;
use log::debug;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};

use crate::{
    aggregation::TemporalAggregator,
    annotations::{AnnotationHandle, AnnotationStore},
    errors::{AggregationError, CoreError},
    metrics::{PassMetrics, PipelineMetrics},
    models::{LatLng, PolygonId, PolygonPatch, TimeWindow},
    rules::RuleSet,
};

use super::report::{PolygonOutcome, RecomputeReport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// The window most recently requested, stamped with a generation number.
/// Results computed for an older generation are dropped at apply time.
#[derive(Debug, Default)]
struct ActiveWindow {
    generation: u64,
    window: Option<TimeWindow>,
}

type AggregationResult = (PolygonId, Result<f64, AggregationError>);

/// Recolors every polygon from the external series whenever the window, the
/// rules or the metric change.
#[derive(Clone)]
pub struct ClassificationPipeline {
    store: AnnotationHandle,
    rules: Arc<RwLock<RuleSet>>,
    metric: Arc<RwLock<String>>,
    aggregator: TemporalAggregator,
    active: Arc<Mutex<ActiveWindow>>,
    metrics: PipelineMetrics,
}

impl ClassificationPipeline {
    pub fn new(
        store: AnnotationHandle,
        rules: RuleSet,
        metric: impl Into<String>,
        aggregator: TemporalAggregator,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            store,
            rules: Arc::new(RwLock::new(rules)),
            metric: Arc::new(RwLock::new(metric.into())),
            aggregator,
            active: Arc::new(Mutex::new(ActiveWindow::default())),
            metrics,
        }
    }

    pub fn store(&self) -> &AnnotationHandle {
        &self.store
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub async fn active_window(&self) -> Option<TimeWindow> {
        self.active.lock().await.window
    }

    pub async fn rules(&self) -> RuleSet {
        self.rules.read().await.clone()
    }

    /// Applies a fallible edit to the rules. Failed edits leave the rules as they
    /// were, so recoloring them is a no-op.
    pub async fn edit_rules<R>(
        &self,
        edit: impl FnOnce(&mut RuleSet) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        self.with_rules_mut(edit).await
    }

    /// Runs `edit` under the rule write lock, then recolors every polygon that
    /// already has a value before the lock is released. No data is refetched:
    /// representative values only go stale when the window or metric changes.
    pub async fn with_rules_mut<R>(&self, edit: impl FnOnce(&mut RuleSet) -> R) -> R {
        let mut rules = self.rules.write().await;
        let result = edit(&mut *rules);

        let recolored = self.store.mutate(|store| recolor(store, &rules)).await;
        if recolored > 0 {
            log_info!("rule edit recolored {} polygons", recolored);
        }
        result
    }

    pub async fn metric(&self) -> String {
        self.metric.read().await.clone()
    }

    pub async fn set_metric(&self, metric: &str) -> Result<(), CoreError> {
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(CoreError::Validation("metric name must not be empty".into()));
        }
        *self.metric.write().await = metric.to_owned();
        Ok(())
    }

    /// Makes `window` the active one and returns its generation. Any pass still
    /// running for an earlier generation will have its results discarded.
    pub async fn request_window(&self, window: TimeWindow) -> u64 {
        let mut active = self.active.lock().await;
        active.generation += 1;
        active.window = Some(window);
        active.generation
    }

    /// Starts a new generation for the active window, if one has been set.
    /// Used when the metric changes but the window does not.
    pub async fn request_current(&self) -> Option<(u64, TimeWindow)> {
        let mut active = self.active.lock().await;
        let window = active.window?;
        active.generation += 1;
        Some((active.generation, window))
    }

    /// `request_window` followed by `recompute_generation`.
    pub async fn recompute_all(&self, window: TimeWindow) -> RecomputeReport {
        let generation = self.request_window(window).await;
        self.recompute_generation(generation, window).await
    }

    /// Recomputes every polygon present right now for a previously requested window.
    ///
    /// Never fails: per-polygon aggregation errors are reported as outcomes and
    /// leave that polygon's previous classification in place. If another
    /// window is requested before this pass finishes, nothing from this pass
    /// is applied and the report comes back `superseded`.
    pub async fn recompute_generation(&self, generation: u64, window: TimeWindow) -> RecomputeReport {
        let started = Instant::now();

        let targets = self
            .store
            .read(|store| {
                store
                    .list()
                    .iter()
                    .map(|polygon| (polygon.id, polygon.centroid))
                    .collect::<Vec<_>>()
            })
            .await;

        if self.active.lock().await.generation != generation {
            log_info!("window {} superseded before its fetches started", window);
            let report = RecomputeReport {
                generation,
                window,
                superseded: true,
                outcomes: targets
                    .iter()
                    .map(|&(id, _)| PolygonOutcome::Discarded { id })
                    .collect(),
            };
            self.record(&report, targets.len(), started).await;
            return report;
        }

        log_info!(
            "recompute generation {} for window {} over {} polygons",
            generation,
            window,
            targets.len()
        );

        let results = self.fan_out(&targets, window).await;
        let report = self.apply(generation, window, results).await;
        self.record(&report, targets.len(), started).await;
        report
    }

    /// Classifies a single polygon for the active window without starting a new
    /// generation, so a window change in the meantime still wins.
    pub async fn refresh_polygon(&self, id: PolygonId) -> Option<PolygonOutcome> {
        let started = Instant::now();

        let (generation, window) = {
            let active = self.active.lock().await;
            (active.generation, active.window?)
        };

        let centroid = self
            .store
            .read(|store| store.get(id).map(|polygon| polygon.centroid))
            .await?;

        let results = self.fan_out(&[(id, centroid)], window).await;
        let report = self.apply(generation, window, results).await;
        self.record(&report, 1, started).await;
        report.outcomes.into_iter().next()
    }

    async fn fan_out(
        &self,
        targets: &[(PolygonId, LatLng)],
        window: TimeWindow,
    ) -> Vec<AggregationResult> {
        let metric = self.metric().await;

        let handles: Vec<(PolygonId, JoinHandle<Result<f64, AggregationError>>)> = targets
            .iter()
            .map(|&(id, centroid)| {
                let aggregator = self.aggregator.clone();
                let metric = metric.clone();
                let handle =
                    tokio::spawn(async move { aggregator.aggregate(centroid, window, &metric).await });
                (id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(AggregationError::Task(join_err.to_string())),
            };
            results.push((id, result));
        }
        results
    }

    async fn apply(
        &self,
        generation: u64,
        window: TimeWindow,
        results: Vec<AggregationResult>,
    ) -> RecomputeReport {
        // Held through the store write so a newer generation cannot start
        // applying between our check and our write.
        let active = self.active.lock().await;

        if active.generation != generation {
            log_info!(
                "discarding {} results for window {} (generation {} superseded by {})",
                results.len(),
                window,
                generation,
                active.generation
            );
            return RecomputeReport {
                generation,
                window,
                superseded: true,
                outcomes: results
                    .into_iter()
                    .map(|(id, _)| PolygonOutcome::Discarded { id })
                    .collect(),
            };
        }

        // Held through the store write so a concurrent rule edit recolors after
        // this pass, never before it.
        let rules = self.rules.read().await;

        let outcomes = self
            .store
            .mutate(|store| {
                results
                    .into_iter()
                    .map(|(id, result)| {
                        let value = match result {
                            Ok(value) => value,
                            Err(error) => return PolygonOutcome::Failed { id, error },
                        };
                        let color = rules.classify(value).to_owned();
                        let patch = PolygonPatch::classification(value, color.clone(), window.start());
                        match store.update(id, patch) {
                            Ok(_) => PolygonOutcome::Updated { id, value, color },
                            Err(CoreError::NotFound(_)) => PolygonOutcome::Removed { id },
                            Err(err) => PolygonOutcome::Failed {
                                id,
                                error: AggregationError::Rejected(err),
                            },
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .await;

        drop(rules);
        drop(active);

        for outcome in &outcomes {
            match outcome {
                PolygonOutcome::Updated { id, value, color } => {
                    debug!("polygon {id} -> {value:.2} ({color}) for window {window}");
                }
                PolygonOutcome::Failed { id, error } => {
                    log_warn!(
                        "polygon {} keeps its previous color; aggregation for window {} failed: {}",
                        id,
                        window,
                        error
                    );
                }
                PolygonOutcome::Removed { id } => {
                    debug!("polygon {id} was removed before its result arrived");
                }
                PolygonOutcome::Discarded { .. } => {}
            }
        }

        RecomputeReport {
            generation,
            window,
            superseded: false,
            outcomes,
        }
    }

    async fn record(&self, report: &RecomputeReport, polygon_count: usize, started: Instant) {
        let failure_kinds: Vec<&'static str> = report.failures().map(|(_, err)| err.kind()).collect();

        let pass = PassMetrics {
            timestamp: Utc::now(),
            generation: report.generation,
            window: report.window.to_string(),
            polygon_count,
            updated: report.updated_count(),
            failed: failure_kinds.len(),
            removed: report.removed_count(),
            superseded: report.superseded,
            total_ms: started.elapsed().as_millis() as u64,
        };

        self.metrics.record_pass(pass, &failure_kinds).await;
    }
}

/// Reclassifies the stored values against `rules`. Polygons without a value
/// keep the fallback color; only colors that actually change are written.
fn recolor(store: &mut AnnotationStore, rules: &RuleSet) -> usize {
    let changes: Vec<(PolygonId, String)> = store
        .list()
        .iter()
        .filter_map(|polygon| {
            let color = rules.classify(polygon.representative_value?);
            (color != polygon.applied_color).then(|| (polygon.id, color.to_owned()))
        })
        .collect();

    changes
        .into_iter()
        .filter_map(|(id, color)| store.update(id, PolygonPatch::color(color)).ok())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{HourlySeries, SeriesFuture, SeriesRequest, SeriesSource};
    use crate::annotations::AnnotationStore;
    use crate::models::{parse_hour_stamp, Operator, ThresholdRule};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const HOURS: [&str; 4] = [
        "2025-08-05T00:00",
        "2025-08-05T01:00",
        "2025-08-05T02:00",
        "2025-08-05T03:00",
    ];

    /// Serves a fixed four-hour series per polygon, keyed by the rounded
    /// centroid latitude. Keys listed in `failing` answer with a network error.
    /// Requests whose window starts at `gated_start` wait for a `release` permit
    /// after announcing themselves on `entered`.
    struct ScriptedSource {
        series: HashMap<i64, Vec<Option<f64>>>,
        failing: StdMutex<HashSet<i64>>,
        calls: StdMutex<usize>,
        gated_start: Option<String>,
        entered: Semaphore,
        release: Semaphore,
    }

    impl ScriptedSource {
        fn new(series: &[(i64, [Option<f64>; 4])]) -> Self {
            Self {
                series: series.iter().map(|(key, values)| (*key, values.to_vec())).collect(),
                failing: StdMutex::new(HashSet::new()),
                calls: StdMutex::new(0),
                gated_start: None,
                entered: Semaphore::new(0),
                release: Semaphore::new(0),
            }
        }

        fn gated(mut self, start: &str) -> Self {
            self.gated_start = Some(start.to_string());
            self
        }

        fn fail(&self, key: i64) {
            self.failing.lock().unwrap().insert(key);
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        async fn serve(&self, request: &SeriesRequest) -> Result<HourlySeries, AggregationError> {
            *self.calls.lock().unwrap() += 1;
            let key = request.point.lat.round() as i64;

            let start = crate::models::format_hour_stamp(&request.window.start());
            if self.gated_start.as_deref() == Some(start.as_str()) {
                self.entered.add_permits(1);
                self.release
                    .acquire()
                    .await
                    .map_err(|err| AggregationError::Task(err.to_string()))?
                    .forget();
            }

            if self.failing.lock().unwrap().contains(&key) {
                return Err(AggregationError::Network("connection reset".into()));
            }

            let values = self
                .series
                .get(&key)
                .cloned()
                .ok_or_else(|| AggregationError::Parse(format!("no series for {key}")))?;
            HourlySeries::from_parallel(HOURS.iter().map(|h| h.to_string()).collect(), values)
        }
    }

    impl SeriesSource for ScriptedSource {
        fn fetch<'a>(&'a self, request: &'a SeriesRequest) -> SeriesFuture<'a> {
            Box::pin(self.serve(request))
        }
    }

    struct StalledSource;

    impl SeriesSource for StalledSource {
        fn fetch<'a>(&'a self, _request: &'a SeriesRequest) -> SeriesFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    fn banded_rules() -> RuleSet {
        RuleSet::new(
            vec![
                ThresholdRule::new("red", Operator::Lt, 10.0),
                ThresholdRule::new("blue", Operator::Lt, 25.0),
                ThresholdRule::new("green", Operator::Ge, 25.0),
            ],
            "purple",
        )
    }

    fn pipeline(source: Arc<dyn SeriesSource>, timeout: Duration) -> ClassificationPipeline {
        let store = AnnotationHandle::new(AnnotationStore::new(vec!["Crop Field".into()], "purple"));
        let aggregator = TemporalAggregator::new(source, "auto", timeout);
        ClassificationPipeline::new(
            store,
            banded_rules(),
            "temperature_2m",
            aggregator,
            PipelineMetrics::new(),
        )
    }

    /// Triangle whose centroid latitude rounds to `lat`.
    fn triangle(lat: f64) -> Vec<LatLng> {
        vec![
            LatLng::new(lat, 78.0),
            LatLng::new(lat + 0.002, 78.0),
            LatLng::new(lat + 0.001, 78.003),
        ]
    }

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::parse(start, end).unwrap()
    }

    async fn color_of(pipeline: &ClassificationPipeline, id: PolygonId) -> String {
        pipeline.store().get(id).await.unwrap().applied_color
    }

    #[tokio::test]
    async fn test_window_mean_is_classified_and_written_back() {
        let source = Arc::new(ScriptedSource::new(&[(10, [Some(10.0), Some(20.0), None, None])]));
        let pipeline = pipeline(source, Duration::from_secs(5));
        let polygon = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();
        let window = window("2025-08-05T00:00", "2025-08-05T01:00");

        let report = pipeline.recompute_all(window).await;

        assert!(!report.superseded);
        assert_eq!(
            report.outcome_for(polygon.id),
            Some(&PolygonOutcome::Updated {
                id: polygon.id,
                value: 15.0,
                color: "blue".into()
            })
        );
        let stored = pipeline.store().get(polygon.id).await.unwrap();
        assert_eq!(stored.representative_value, Some(15.0));
        assert_eq!(stored.applied_color, "blue");
        assert_eq!(
            stored.window_timestamp,
            Some(parse_hour_stamp("2025-08-05T00:00").unwrap())
        );
    }

    #[tokio::test]
    async fn test_one_failure_leaves_other_polygons_updating() {
        let source = Arc::new(ScriptedSource::new(&[
            (10, [Some(5.0), Some(5.0), Some(30.0), Some(30.0)]),
            (20, [Some(5.0), Some(5.0), Some(20.0), Some(20.0)]),
            (30, [Some(5.0), Some(5.0), Some(26.0), Some(28.0)]),
        ]));
        let pipeline = pipeline(source.clone(), Duration::from_secs(5));
        let a = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();
        let b = pipeline.store().create(triangle(20.0), "Crop Field").await.unwrap();
        let c = pipeline.store().create(triangle(30.0), "Crop Field").await.unwrap();

        let early = window("2025-08-05T00:00", "2025-08-05T01:00");
        let first = pipeline.recompute_all(early).await;
        assert_eq!(first.updated_count(), 3);

        source.fail(20);
        let late = window("2025-08-05T02:00", "2025-08-05T03:00");
        let second = pipeline.recompute_all(late).await;

        assert_eq!(second.updated_count(), 2);
        let failures: Vec<_> = second.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, b.id);
        assert_eq!(failures[0].1.kind(), "network");

        assert_eq!(color_of(&pipeline, a.id).await, "green");
        assert_eq!(color_of(&pipeline, c.id).await, "green");

        let kept = pipeline.store().get(b.id).await.unwrap();
        assert_eq!(kept.applied_color, "red");
        assert_eq!(kept.representative_value, Some(5.0));
        assert_eq!(kept.window_timestamp, Some(early.start()));

        let metrics = pipeline.metrics().get_snapshot().await;
        assert_eq!(metrics.pass_count, 2);
        assert_eq!(metrics.failure_count, 1);
        assert_eq!(metrics.failures_by_kind.get("network"), Some(&1));
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let source = Arc::new(ScriptedSource::new(&[
            (10, [Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            (20, [Some(24.0), Some(26.0), None, None]),
        ]));
        let pipeline = pipeline(source.clone(), Duration::from_secs(5));
        pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();
        pipeline.store().create(triangle(20.0), "Crop Field").await.unwrap();
        let window = window("2025-08-05T00:00", "2025-08-05T03:00");

        pipeline.recompute_all(window).await;
        let first = pipeline.store().list().await;
        pipeline.recompute_all(window).await;
        let second = pipeline.store().list().await;

        assert_eq!(first, second);
        assert_eq!(source.calls(), 4);
        let colors: Vec<_> = second.iter().map(|p| p.applied_color.as_str()).collect();
        assert_eq!(colors, vec!["red", "green"]);
    }

    #[tokio::test]
    async fn test_superseded_window_results_are_discarded() {
        let source = Arc::new(
            ScriptedSource::new(&[
                (10, [Some(5.0), Some(5.0), Some(30.0), Some(30.0)]),
                (20, [Some(5.0), Some(5.0), Some(12.0), Some(14.0)]),
            ])
            .gated("2025-08-05T00:00"),
        );
        let pipeline = pipeline(source.clone(), Duration::from_secs(5));
        let a = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();
        let b = pipeline.store().create(triangle(20.0), "Crop Field").await.unwrap();

        let stale_window = window("2025-08-05T00:00", "2025-08-05T01:00");
        let fresh_window = window("2025-08-05T02:00", "2025-08-05T03:00");

        let slow = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.recompute_all(stale_window).await })
        };
        source.entered.acquire_many(2).await.unwrap().forget();

        let fresh = pipeline.recompute_all(fresh_window).await;
        assert!(!fresh.superseded);
        assert_eq!(fresh.updated_count(), 2);

        source.release.add_permits(2);
        let stale = slow.await.unwrap();
        assert!(stale.superseded);
        assert!(stale
            .outcomes
            .iter()
            .all(|o| matches!(o, PolygonOutcome::Discarded { .. })));

        assert_eq!(color_of(&pipeline, a.id).await, "green");
        assert_eq!(color_of(&pipeline, b.id).await, "blue");
        let stored = pipeline.store().get(a.id).await.unwrap();
        assert_eq!(stored.window_timestamp, Some(fresh_window.start()));
        assert_eq!(pipeline.active_window().await, Some(fresh_window));
        assert_eq!(pipeline.metrics().get_snapshot().await.superseded_count, 1);
    }

    #[tokio::test]
    async fn test_generation_superseded_before_start_skips_fetching() {
        let source = Arc::new(ScriptedSource::new(&[(10, [Some(5.0), Some(5.0), None, None])]));
        let pipeline = pipeline(source.clone(), Duration::from_secs(5));
        let polygon = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();

        let first = pipeline
            .request_window(window("2025-08-05T00:00", "2025-08-05T01:00"))
            .await;
        let second = pipeline
            .request_window(window("2025-08-05T00:00", "2025-08-05T00:00"))
            .await;
        assert!(second > first);

        let stale = pipeline
            .recompute_generation(first, window("2025-08-05T00:00", "2025-08-05T01:00"))
            .await;
        assert!(stale.superseded);
        assert_eq!(stale.outcome_for(polygon.id), Some(&PolygonOutcome::Discarded { id: polygon.id }));
        assert_eq!(source.calls(), 0);
        assert_eq!(color_of(&pipeline, polygon.id).await, "purple");
    }

    #[tokio::test]
    async fn test_polygons_added_or_removed_mid_flight() {
        let source = Arc::new(
            ScriptedSource::new(&[
                (10, [Some(5.0), Some(5.0), None, None]),
                (20, [Some(5.0), Some(5.0), None, None]),
                (30, [Some(5.0), Some(5.0), None, None]),
            ])
            .gated("2025-08-05T00:00"),
        );
        let pipeline = pipeline(source.clone(), Duration::from_secs(5));
        let a = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();
        let b = pipeline.store().create(triangle(20.0), "Crop Field").await.unwrap();

        let pass = {
            let pipeline = pipeline.clone();
            let window = window("2025-08-05T00:00", "2025-08-05T01:00");
            tokio::spawn(async move { pipeline.recompute_all(window).await })
        };
        source.entered.acquire_many(2).await.unwrap().forget();

        let late = pipeline.store().create(triangle(30.0), "Crop Field").await.unwrap();
        pipeline.store().remove(b.id).await.unwrap();
        source.release.add_permits(2);

        let report = pass.await.unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcome_for(late.id).is_none());
        assert_eq!(report.outcome_for(b.id), Some(&PolygonOutcome::Removed { id: b.id }));
        assert_eq!(color_of(&pipeline, a.id).await, "red");
        assert_eq!(color_of(&pipeline, late.id).await, "purple");
    }

    #[tokio::test]
    async fn test_stalled_source_times_out_without_touching_state() {
        let timeout = Duration::from_millis(20);
        let pipeline = pipeline(Arc::new(StalledSource), timeout);
        let polygon = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();

        let report = pipeline
            .recompute_all(window("2025-08-05T00:00", "2025-08-05T01:00"))
            .await;

        assert_eq!(
            report.outcome_for(polygon.id),
            Some(&PolygonOutcome::Failed {
                id: polygon.id,
                error: AggregationError::Timeout(timeout)
            })
        );
        let stored = pipeline.store().get(polygon.id).await.unwrap();
        assert_eq!(stored.applied_color, "purple");
        assert_eq!(stored.representative_value, None);
    }

    #[tokio::test]
    async fn test_rule_edit_recolors_stored_values_without_fetching() {
        let source = Arc::new(ScriptedSource::new(&[(10, [Some(5.0), Some(5.0), None, None])]));
        let pipeline = pipeline(source.clone(), Duration::from_secs(5));
        let polygon = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();

        pipeline
            .recompute_all(window("2025-08-05T00:00", "2025-08-05T01:00"))
            .await;
        assert_eq!(color_of(&pipeline, polygon.id).await, "red");
        let unvalued = pipeline.store().create(triangle(20.0), "Crop Field").await.unwrap();

        // The upstream is down now; the edit must not depend on it.
        source.fail(10);
        pipeline
            .edit_rules(|rules| rules.set_rule(0, ThresholdRule::new("yellow", Operator::Le, 5.0)))
            .await
            .unwrap();

        let stored = pipeline.store().get(polygon.id).await.unwrap();
        assert_eq!(stored.representative_value, Some(5.0));
        assert_eq!(stored.applied_color, "yellow");
        assert_eq!(stored.applied_color, pipeline.rules().await.classify(5.0));
        assert_eq!(color_of(&pipeline, unvalued.id).await, "purple");
        assert_eq!(source.calls(), 1);

        pipeline
            .with_rules_mut(|rules| rules.remove_rule(0))
            .await
            .unwrap();
        assert_eq!(color_of(&pipeline, polygon.id).await, "red");
    }

    #[tokio::test]
    async fn test_failed_rule_edit_changes_nothing() {
        let source = Arc::new(ScriptedSource::new(&[(10, [Some(5.0), Some(5.0), None, None])]));
        let pipeline = pipeline(source, Duration::from_secs(5));
        let polygon = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();
        pipeline
            .recompute_all(window("2025-08-05T00:00", "2025-08-05T01:00"))
            .await;
        let mut snapshots = pipeline.store().subscribe();
        snapshots.borrow_and_update();

        let err = pipeline
            .edit_rules(|rules| rules.remove_rule(9))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::IndexOutOfRange { .. }));
        assert_eq!(pipeline.rules().await.len(), 3);
        assert_eq!(color_of(&pipeline, polygon.id).await, "red");
        assert!(!snapshots.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_metric_change_refetches_current_window() {
        let source = Arc::new(ScriptedSource::new(&[(10, [Some(5.0), Some(5.0), None, None])]));
        let pipeline = pipeline(source.clone(), Duration::from_secs(5));
        pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();

        assert!(pipeline.request_current().await.is_none());
        let window = window("2025-08-05T00:00", "2025-08-05T01:00");
        pipeline.recompute_all(window).await;

        pipeline.set_metric("relative_humidity_2m").await.unwrap();
        let (generation, current) = pipeline.request_current().await.unwrap();
        assert_eq!(current, window);
        let report = pipeline.recompute_generation(generation, current).await;
        assert_eq!(report.updated_count(), 1);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_overflowing_series_counts_as_its_own_failure_kind() {
        let source = Arc::new(ScriptedSource::new(&[(
            10,
            [Some(f64::MAX), Some(f64::MAX), None, None],
        )]));
        let pipeline = pipeline(source, Duration::from_secs(5));
        let polygon = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();

        let report = pipeline
            .recompute_all(window("2025-08-05T00:00", "2025-08-05T01:00"))
            .await;

        assert_eq!(
            report.outcome_for(polygon.id),
            Some(&PolygonOutcome::Failed {
                id: polygon.id,
                error: AggregationError::NonFinite
            })
        );
        let metrics = pipeline.metrics().get_snapshot().await;
        assert_eq!(metrics.failures_by_kind.get("nonFinite"), Some(&1));
        assert_eq!(metrics.failures_by_kind.get("parse"), None);
        assert_eq!(color_of(&pipeline, polygon.id).await, "purple");
    }

    #[tokio::test]
    async fn test_refresh_single_polygon_uses_active_window() {
        let source = Arc::new(ScriptedSource::new(&[
            (10, [Some(40.0), Some(40.0), None, None]),
        ]));
        let pipeline = pipeline(source, Duration::from_secs(5));
        let polygon = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();

        assert!(pipeline.refresh_polygon(polygon.id).await.is_none());

        pipeline
            .recompute_all(window("2025-08-05T00:00", "2025-08-05T01:00"))
            .await;
        let late = pipeline.store().create(triangle(10.0), "Crop Field").await.unwrap();
        assert_eq!(color_of(&pipeline, late.id).await, "purple");

        let outcome = pipeline.refresh_polygon(late.id).await.unwrap();
        assert!(matches!(outcome, PolygonOutcome::Updated { ref color, .. } if color == "green"));
        assert_eq!(color_of(&pipeline, late.id).await, "green");
    }

    #[tokio::test]
    async fn test_set_metric_rejects_blank() {
        let pipeline = pipeline(Arc::new(StalledSource), Duration::from_millis(10));
        assert!(pipeline.set_metric("  ").await.is_err());
        pipeline.set_metric("relative_humidity_2m").await.unwrap();
        assert_eq!(pipeline.metric().await, "relative_humidity_2m");
    }
}
