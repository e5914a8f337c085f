//! InfluxDB adapter: line-protocol writes for live telemetry and InfluxQL
//! range queries for the campaign history view.

pub mod error;
pub mod line_protocol;
pub mod query;
pub mod target;
pub mod writer;

pub use error::TimeseriesError;
pub use query::{InfluxQueryClient, SeriesQuery, SeriesTable};
pub use target::{normalize_base_url, ResolvedTarget};
pub use writer::{InfluxWriter, WriteOutcome};
