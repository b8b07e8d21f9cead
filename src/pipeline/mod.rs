pub mod controller;
pub mod report;

pub use controller::ClassificationPipeline;
pub use report::{PolygonOutcome, RecomputeReport};
