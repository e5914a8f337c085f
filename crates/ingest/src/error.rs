//! Ingestion error types.

use bsn_core::BsnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid mqtt configuration: {0}")]
    InvalidConfig(#[from] BsnError),

    #[error("invalid qos level: {0}")]
    InvalidQos(u8),

    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}
