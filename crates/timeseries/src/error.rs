//! Time-series adapter error types.

use bsn_core::BsnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeseriesError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("influx returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid influx response: {0}")]
    Decode(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(BsnError),
}

impl From<TimeseriesError> for BsnError {
    fn from(e: TimeseriesError) -> Self {
        match e {
            TimeseriesError::InvalidInput(msg) => BsnError::InvalidInput(msg),
            TimeseriesError::NotFound(msg) => BsnError::NotFound(msg),
            TimeseriesError::Store(inner) => inner,
            other => BsnError::Upstream(other.to_string()),
        }
    }
}
