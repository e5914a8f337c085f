use thiserror::Error;

/// Caller-visible failure classes shared by every crate in the workspace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BsnError {
    /// Malformed identifiers, missing filters or targets.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A second live worker set was requested for an active campaign.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Broker or time-series engine failure.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Campaign persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// Local failure of the host process (e.g. a worker could not be spawned).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to pick HTTP status codes at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Upstream,
    Store,
    Internal,
}

impl BsnError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        BsnError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BsnError::NotFound(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BsnError::InvalidInput(_) => ErrorKind::InvalidInput,
            BsnError::NotFound(_) => ErrorKind::NotFound,
            BsnError::Conflict(_) => ErrorKind::Conflict,
            BsnError::Upstream(_) => ErrorKind::Upstream,
            BsnError::Store(_) => ErrorKind::Store,
            BsnError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type BsnResult<T> = Result<T, BsnError>;
