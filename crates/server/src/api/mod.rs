//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area.
//! Shared error types and the status mapping live here in mod.rs.

pub mod campaigns;
pub mod doc;
pub mod health;
pub mod series;
pub mod stream;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use bsn_core::{BsnError, ErrorKind};

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QueryErrorResponse {
    pub error: String,
}

pub(crate) type ApiResult<T> = Result<T, (StatusCode, Json<QueryErrorResponse>)>;

// ── Error mapping ────────────────────────────────────────────────

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Store | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn api_error(e: impl Into<BsnError>) -> (StatusCode, Json<QueryErrorResponse>) {
    let e = e.into();
    let status = status_for(e.kind());
    if status.is_server_error() {
        tracing::warn!(error = %e, "request failed");
    }
    (
        status,
        Json(QueryErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ── Re-exports ───────────────────────────────────────────────────
// Flat `api::foo` paths used by router.rs route registration.

pub use campaigns::{campaign_start, campaign_status, campaign_stop};
pub use health::health;
pub use series::campaign_series;
pub use stream::sse_imu;
