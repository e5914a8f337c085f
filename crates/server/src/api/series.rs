//! Historical series endpoint.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use bsn_core::{CampaignId, FieldValue};
use bsn_timeseries::{SeriesQuery, SeriesTable};

use crate::state::AppState;

use super::{api_error, ApiResult, QueryErrorResponse};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct SeriesParams {
    /// Measurement prefix (default `campaign`); `_<id>` is appended.
    pub measurement: Option<String>,
    /// Comma-separated sensor codes.
    pub sensor_ids: Option<String>,
    /// Maximum rows (default 1000, max 5000).
    pub limit: Option<i64>,
    /// Seconds after campaign start; when given rows are returned oldest first.
    pub from_seconds: Option<i64>,
    /// Overrides the campaign's storage host.
    pub db_host: Option<String>,
    /// Overrides the campaign's storage database.
    pub db_name: Option<String>,
}

impl From<SeriesParams> for SeriesQuery {
    fn from(p: SeriesParams) -> Self {
        SeriesQuery {
            measurement: p.measurement,
            sensor_ids: p.sensor_ids,
            limit: p.limit,
            from_seconds: p.from_seconds,
            db_host: p.db_host,
            db_name: p.db_name,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    pub campaign_id: CampaignId,
    pub measurement: String,
    pub columns: Vec<String>,
    /// One array per row, aligned with `columns`; cells are numbers, booleans, strings or null.
    #[schema(value_type = Vec<Vec<Object>>)]
    pub rows: Vec<Vec<Option<FieldValue>>>,
}

impl From<SeriesTable> for SeriesResponse {
    fn from(t: SeriesTable) -> Self {
        Self {
            campaign_id: t.campaign_id,
            measurement: t.measurement,
            columns: t.columns,
            rows: t.rows,
        }
    }
}

/// Campaign time series
///
/// Queries the campaign's time-series database. Transport and upstream
/// failures are reported as 502.
#[utoipa::path(
    get,
    path = "/api/campaigns/{id}/series",
    tag = "Campaigns",
    params(("id" = i64, Path, description = "Campaign ID"), SeriesParams),
    responses(
        (status = 200, description = "Tabular series", body = SeriesResponse),
        (status = 400, description = "Invalid parameters or no target", body = QueryErrorResponse),
        (status = 404, description = "Campaign not found", body = QueryErrorResponse),
        (status = 502, description = "Time-series engine failure", body = QueryErrorResponse)
    )
)]
pub async fn campaign_series(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CampaignId>,
    Query(params): Query<SeriesParams>,
) -> ApiResult<Json<SeriesResponse>> {
    let table = state
        .series
        .query_campaign_series(id, &params.into())
        .await
        .map_err(api_error)?;
    Ok(Json(table.into()))
}
