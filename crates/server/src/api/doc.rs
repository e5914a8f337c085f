//! OpenAPI documentation aggregator.
//!
//! Collects all `#[utoipa::path]`-annotated handlers and `ToSchema`-derived
//! types into a single OpenAPI 3.1 spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "bsn-server API",
        version = "0.1.0",
        description = "Live body-sensor telemetry, historical series and campaign worker control.",
    ),
    tags(
        (name = "Health", description = "Server readiness and ingestion counters"),
        (name = "Live", description = "Server-sent event stream of live telemetry"),
        (name = "Campaigns", description = "Campaign series queries and worker lifecycle"),
    ),
    paths(
        // Health
        crate::api::health::health,
        // Live
        crate::api::stream::sse_imu,
        // Campaigns
        crate::api::series::campaign_series,
        crate::api::campaigns::campaign_start,
        crate::api::campaigns::campaign_stop,
        crate::api::campaigns::campaign_status,
    ),
    components(schemas(
        crate::api::QueryErrorResponse,
        crate::api::health::HealthResponse,
        crate::api::series::SeriesResponse,
        crate::api::campaigns::CampaignStartResponse,
        crate::api::campaigns::CampaignStopResponse,
        crate::api::campaigns::CampaignStatusResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for p in [
            "/health",
            "/sse/imu",
            "/api/campaigns/{id}/series",
            "/api/campaigns/{id}/start",
            "/api/campaigns/{id}/stop",
            "/api/campaigns/{id}/status",
        ] {
            assert!(paths.contains(&p), "missing {p}");
        }
    }
}
