use std::sync::Arc;
use std::time::Duration;

use crate::errors::AggregationError;
use crate::models::{LatLng, TimeWindow};

use super::series::{reduce_window, HourlySeries};
use super::source::{SeriesRequest, SeriesSource};

/// Reduces an external hourly series to one representative value per point and window.
#[derive(Clone)]
pub struct TemporalAggregator {
    source: Arc<dyn SeriesSource>,
    timezone: String,
    timeout: Duration,
}

impl TemporalAggregator {
    pub fn new(source: Arc<dyn SeriesSource>, timezone: impl Into<String>, timeout: Duration) -> Self {
        Self {
            source,
            timezone: timezone.into(),
            timeout,
        }
    }

    /// Fetches the raw series, bounded by the configured timeout.
    pub async fn fetch_series(
        &self,
        point: LatLng,
        window: TimeWindow,
        metric: &str,
    ) -> Result<HourlySeries, AggregationError> {
        let request = SeriesRequest {
            point,
            window,
            metric: metric.to_owned(),
            timezone: self.timezone.clone(),
        };

        match tokio::time::timeout(self.timeout, self.source.fetch(&request)).await {
            Ok(result) => result,
            Err(_) => Err(AggregationError::Timeout(self.timeout)),
        }
    }

    /// Fetch followed by the window mean.
    pub async fn aggregate(
        &self,
        point: LatLng,
        window: TimeWindow,
        metric: &str,
    ) -> Result<f64, AggregationError> {
        let series = self.fetch_series(point, window, metric).await?;
        reduce_window(&series, &window)
    }
}
