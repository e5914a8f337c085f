//! Health endpoint.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub mqtt_enabled: bool,
    pub mqtt_connected: bool,
    pub subscribers: usize,
    pub supervised_campaigns: usize,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub influx_writes_dropped: u64,
}

/// Server health
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Server health", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.ingest.stats();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mqtt_enabled: state.config.mqtt.enabled,
        mqtt_connected: state.mqtt_connected.load(Ordering::Relaxed),
        subscribers: state.hub.subscriber_count(),
        supervised_campaigns: state.supervisor.campaign_count(),
        messages_received: stats.received,
        messages_dropped: stats.dropped,
        influx_writes_dropped: state.writer.dropped_writes(),
    })
}
