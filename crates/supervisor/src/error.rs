//! Supervisor error types.

use bsn_core::{BsnError, CampaignId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("campaign {0} already has live worker processes")]
    AlreadyRunning(CampaignId),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid worker configuration: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(BsnError),
}

impl From<SupervisorError> for BsnError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::AlreadyRunning(_) => BsnError::Conflict(e.to_string()),
            SupervisorError::InvalidInput(msg) => BsnError::InvalidInput(msg),
            SupervisorError::NotFound(msg) => BsnError::NotFound(msg),
            SupervisorError::Store(inner) => inner,
            SupervisorError::Spawn(_) => BsnError::Internal(e.to_string()),
        }
    }
}
