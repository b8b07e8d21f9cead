pub mod geo;
pub mod polygon;
pub mod rule;
pub mod window;

pub use geo::{ring_centroid, LatLng, LatLngBounds};
pub use polygon::{Polygon, PolygonId, PolygonPatch, PolygonSummary, MIN_POLYGON_VERTICES};
pub use rule::{Operator, RulePatch, ThresholdRule};
pub use window::{format_hour_stamp, parse_hour_stamp, TimeWindow, HOUR_STAMP_FORMAT};
