pub mod analysis;
pub mod calendar;
pub mod config;
pub mod http;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod resolver;
pub mod sinks;
pub mod sources;
pub mod tenant;
pub mod transform;

pub use pipeline::{ConsumptionImporter, ImportSummary};
