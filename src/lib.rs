pub mod aggregation;
pub mod annotations;
pub mod commands;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod rules;
pub mod settings;
mod stdio;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio_util::task::TaskTracker;

use aggregation::{OpenMeteoSource, SeriesSource, TemporalAggregator};
use annotations::{AnnotationHandle, AnnotationStore};
use metrics::PipelineMetrics;
use pipeline::ClassificationPipeline;
use rules::RuleSet;
use settings::AppConfig;

/// Composition root: the configuration, the pipeline that owns the store and
/// rule set, and the tracker for background recomputes.
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: ClassificationPipeline,
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(config: AppConfig, source: Arc<dyn SeriesSource>) -> Self {
        let store = AnnotationHandle::new(AnnotationStore::new(
            config.known_sources.clone(),
            config.fallback_color.clone(),
        ));
        let rules = RuleSet::new(config.default_rules.clone(), config.fallback_color.clone());
        let aggregator =
            TemporalAggregator::new(source, config.timezone.clone(), config.fetch_timeout());
        let pipeline = ClassificationPipeline::new(
            store,
            rules,
            config.metric.clone(),
            aggregator,
            PipelineMetrics::new(),
        );

        Self {
            config,
            pipeline,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_open_meteo(config: AppConfig) -> Self {
        let source = Arc::new(OpenMeteoSource::new(config.api_base_url.clone()));
        Self::new(config, source)
    }

    /// Makes the configured default window the active one. The store is empty
    /// at this point, so nothing is fetched.
    pub async fn activate_default_window(&self) -> Result<()> {
        let window = self.config.default_window()?;
        self.pipeline.recompute_all(window).await;
        info!("default window {} active", window);
        Ok(())
    }
}

pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("mapshade starting up...");

    let config = AppConfig::load()?;
    info!(
        "sources: {:?}, metric: {}, endpoint: {}",
        config.known_sources, config.metric, config.api_base_url
    );

    let state = AppState::with_open_meteo(config);
    state.activate_default_window().await?;

    stdio::serve(state).await
}
