//! HTTP API handlers for burnin-dash

pub mod analytics;
pub mod annotations;
pub mod health;
pub mod reports;
pub mod stats;
pub mod taxonomy;
pub mod test_runs;

pub use analytics::analytics_routes;
pub use annotations::annotation_routes;
pub use health::{health_routes, session_routes};
pub use reports::report_routes;
pub use stats::stats_routes;
pub use taxonomy::taxonomy_routes;
pub use test_runs::test_routes;
