use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::errors::AggregationError;
use crate::models::{LatLng, TimeWindow};

use super::series::HourlySeries;

pub type SeriesFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HourlySeries, AggregationError>> + Send + 'a>>;

/// Parameters of one time-series lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub point: LatLng,
    pub window: TimeWindow,
    pub metric: String,
    pub timezone: String,
}

/// External hourly time-series provider.
pub trait SeriesSource: Send + Sync {
    /// Returns a series covering at least `request.window` at `request.point`.
    fn fetch<'a>(&'a self, request: &'a SeriesRequest) -> SeriesFuture<'a>;
}

/// Open-Meteo style forecast endpoint: `?latitude&longitude&hourly=<metric>&start_date&end_date&timezone`,
/// answering with parallel `hourly.time` / `hourly.<metric>` arrays.
pub struct OpenMeteoSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: Option<HourlyColumns>,
}

#[derive(Debug, Deserialize)]
struct HourlyColumns {
    time: Vec<String>,
    #[serde(flatten)]
    columns: HashMap<String, serde_json::Value>,
}

impl OpenMeteoSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch_inner(&self, request: &SeriesRequest) -> Result<HourlySeries, AggregationError> {
        let query = [
            ("latitude", request.point.lat.to_string()),
            ("longitude", request.point.lng.to_string()),
            ("hourly", request.metric.clone()),
            ("start_date", request.window.start_date().to_string()),
            ("end_date", request.window.end_date().to_string()),
            ("timezone", request.timezone.clone()),
        ];

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        let body: ForecastResponse = response.json().await?;
        parse_hourly(body, &request.metric)
    }
}

impl SeriesSource for OpenMeteoSource {
    fn fetch<'a>(&'a self, request: &'a SeriesRequest) -> SeriesFuture<'a> {
        Box::pin(self.fetch_inner(request))
    }
}

fn parse_hourly(body: ForecastResponse, metric: &str) -> Result<HourlySeries, AggregationError> {
    let HourlyColumns { time, mut columns } = body
        .hourly
        .ok_or_else(|| AggregationError::Parse("response has no hourly block".into()))?;

    let column = columns
        .remove(metric)
        .ok_or_else(|| AggregationError::Parse(format!("response has no '{metric}' column")))?;

    let values: Vec<Option<f64>> = serde_json::from_value(column)
        .map_err(|err| AggregationError::Parse(format!("bad '{metric}' values: {err}")))?;

    HourlySeries::from_parallel(time, values)
}
