//! Campaign worker start/stop and status endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use bsn_core::CampaignId;

use crate::campaigns::CampaignStatus;
use crate::state::AppState;

use super::{api_error, ApiResult, QueryErrorResponse};

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStartResponse {
    pub campaign_id: CampaignId,
    pub pid: Option<u32>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStopResponse {
    pub campaign_id: CampaignId,
    /// Processes that received a termination request.
    pub terminated: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusResponse {
    pub campaign_id: CampaignId,
    pub name: String,
    pub state: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// At least one supervised worker is alive.
    pub alive: bool,
    pub handles: usize,
}

impl From<CampaignStatus> for CampaignStatusResponse {
    fn from(s: CampaignStatus) -> Self {
        Self {
            campaign_id: s.record.id,
            name: s.record.name,
            state: s.record.state.as_str().to_string(),
            start_time: s.record.start_time,
            end_time: s.record.end_time,
            notes: s.record.notes,
            alive: s.alive,
            handles: s.handles,
        }
    }
}

/// Start campaign worker
#[utoipa::path(
    post,
    path = "/api/campaigns/{id}/start",
    tag = "Campaigns",
    params(("id" = i64, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Worker spawned", body = CampaignStartResponse),
        (status = 400, description = "Campaign not running or misconfigured", body = QueryErrorResponse),
        (status = 404, description = "Campaign not found", body = QueryErrorResponse),
        (status = 409, description = "Worker already running", body = QueryErrorResponse)
    )
)]
pub async fn campaign_start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<CampaignStartResponse>> {
    let started = state.campaigns.start(id).await.map_err(api_error)?;
    Ok(Json(CampaignStartResponse {
        campaign_id: started.campaign_id,
        pid: started.pid,
    }))
}

/// Stop campaign worker
#[utoipa::path(
    post,
    path = "/api/campaigns/{id}/stop",
    tag = "Campaigns",
    params(("id" = i64, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Workers signalled and campaign terminated", body = CampaignStopResponse),
        (status = 404, description = "Campaign not found", body = QueryErrorResponse)
    )
)]
pub async fn campaign_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<CampaignStopResponse>> {
    let terminated = state.campaigns.stop(id).await.map_err(api_error)?;
    Ok(Json(CampaignStopResponse {
        campaign_id: id,
        terminated,
    }))
}

/// Campaign status
#[utoipa::path(
    get,
    path = "/api/campaigns/{id}/status",
    tag = "Campaigns",
    params(("id" = i64, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Persisted state and worker liveness", body = CampaignStatusResponse),
        (status = 404, description = "Campaign not found", body = QueryErrorResponse)
    )
)]
pub async fn campaign_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<CampaignStatusResponse>> {
    let status = state.campaigns.status(id).await.map_err(api_error)?;
    Ok(Json(status.into()))
}
