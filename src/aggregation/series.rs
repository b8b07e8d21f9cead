use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::AggregationError;
use crate::models::TimeWindow;

/// One hourly sample. `value` is `None` when the upstream had no reading for that hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: String,
    pub value: Option<f64>,
}

/// Hourly series keyed by the upstream's exact hour-stamp strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlySeries {
    pub points: Vec<SeriesPoint>,
}

impl HourlySeries {
    /// Zips the parallel `time` / `values` arrays returned by the endpoint.
    pub fn from_parallel(
        times: Vec<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, AggregationError> {
        if times.len() != values.len() {
            return Err(AggregationError::Parse(format!(
                "series has {} timestamps but {} values",
                times.len(),
                values.len()
            )));
        }

        let points = times
            .into_iter()
            .zip(values)
            .map(|(time, value)| SeriesPoint { time, value })
            .collect();

        Ok(Self { points })
    }
}

/// Mean of the non-null values whose hour stamp belongs to the window.
///
/// Membership is decided by exact match against the window's expanded hour
/// stamps, not by comparing parsed times.
pub fn reduce_window(series: &HourlySeries, window: &TimeWindow) -> Result<f64, AggregationError> {
    let stamps: HashSet<String> = window.hour_stamps().into_iter().collect();

    let (sum, count) = series
        .points
        .iter()
        .filter(|point| stamps.contains(&point.time))
        .filter_map(|point| point.value)
        .filter(|value| value.is_finite())
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        return Err(AggregationError::NoData);
    }

    let mean = sum / count as f64;
    if !mean.is_finite() {
        return Err(AggregationError::NonFinite);
    }
    Ok(mean)
}
