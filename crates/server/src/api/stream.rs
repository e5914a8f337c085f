//! SSE live viewer endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use bsn_core::TelemetryEvent;
use bsn_hub::SubscriberFilter;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    /// Comma-separated sensor codes (`imuid` accepted as alias). Blank means all sensors.
    #[serde(alias = "imuid")]
    pub sensor_ids: Option<String>,
    /// Campaign tag (`cname` accepted as alias). Blank means all campaigns.
    #[serde(alias = "cname")]
    pub campaign_tag: Option<String>,
}

fn to_sse(event: &TelemetryEvent) -> Option<Event> {
    match Event::default().event(event.kind.as_str()).json_data(event) {
        Ok(ev) => Some(ev),
        Err(e) => {
            warn!(error = %e, "failed to serialize telemetry event");
            None
        }
    }
}

/// Live telemetry stream
///
/// Streams one named event per telemetry message matching the filters. The
/// event name is the message kind (`imu`, `battery`, `unknown`), the data is
/// the JSON-encoded event.
#[utoipa::path(
    get,
    path = "/sse/imu",
    tag = "Live",
    params(StreamParams),
    responses(
        (status = 200, description = "SSE event stream", content_type = "text/event-stream")
    )
)]
pub async fn sse_imu(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let filter =
        SubscriberFilter::from_params(params.sensor_ids.as_deref(), params.campaign_tag.as_deref());
    let subscription = state.hub.subscribe(filter, state.config.stream.timeout());
    debug!(
        subscriber = subscription.id(),
        sensors = ?params.sensor_ids,
        campaign = ?params.campaign_tag,
        "live viewer connected"
    );

    let stream = subscription.filter_map(|event| std::future::ready(to_sse(&event).map(Ok)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
