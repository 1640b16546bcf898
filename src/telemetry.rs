//! Telemetry domain: metrics events, the bus workers emit on, the aggregator that folds
//! them into rolling windows, and the read-only health report.

pub mod events;
pub mod health;
pub mod routing;

pub use events::MetricsEvent;
pub use health::{HealthReport, WindowStats};
pub use routing::aggregator::MetricsAggregator;
pub use routing::bus::MetricsBus;
