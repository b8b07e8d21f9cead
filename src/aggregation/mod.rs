pub mod aggregator;
pub mod series;
pub mod source;

pub use aggregator::TemporalAggregator;
pub use series::{reduce_window, HourlySeries, SeriesPoint};
pub use source::{OpenMeteoSource, SeriesFuture, SeriesRequest, SeriesSource};
