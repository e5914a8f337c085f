//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

fn cors_layer(origin: &str) -> CorsLayer {
    let origin = origin.trim();
    if origin.is_empty() || origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            tracing::warn!(origin, error = %e, "invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
    }
}

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/health", get(api::health))
        .route("/sse/imu", get(api::sse_imu))
        .route("/api/campaigns/{id}/series", get(api::campaign_series))
        .route("/api/campaigns/{id}/start", post(api::campaign_start))
        .route("/api/campaigns/{id}/stop", post(api::campaign_stop))
        .route("/api/campaigns/{id}/status", get(api::campaign_status))
        .layer(cors)
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use bsn_core::{
        CampaignRecord, CampaignStore, Config, EventKind, Fields, MemoryCampaignStore,
        TelemetryEvent, TelemetrySink,
    };
    use bsn_hub::DistributionHub;
    use bsn_ingest::IngestionDriver;
    use bsn_supervisor::{OsLauncher, ProcessSupervisor};
    use bsn_timeseries::{InfluxQueryClient, InfluxWriter};

    use super::*;
    use crate::campaigns::CampaignService;

    fn state() -> Arc<AppState> {
        let config = Config::for_profile("BSN_TEST_UNSET");
        let mut campaign = CampaignRecord::running(7, "walk");
        campaign.start_time = Some(Utc::now());
        let store: Arc<MemoryCampaignStore> =
            Arc::new(MemoryCampaignStore::with_campaigns([campaign]));
        let supervisor = Arc::new(ProcessSupervisor::new(Arc::new(OsLauncher)));
        let hub = DistributionHub::new(config.stream.buffer);
        let hub_sink: Arc<dyn TelemetrySink> = Arc::new(hub.clone());

        Arc::new(AppState {
            series: InfluxQueryClient::new(store.clone(), &config.influx).unwrap(),
            writer: InfluxWriter::new(store.clone(), config.influx.timeout(), 4).unwrap(),
            campaigns: CampaignService::new(
                store.clone(),
                supervisor.clone(),
                config.workers.clone(),
                config.mqtt.clone(),
            ),
            ingest: Arc::new(IngestionDriver::new(vec![hub_sink])),
            hub,
            store,
            supervisor,
            mqtt_connected: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let resp = build_router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["subscribers"], 0);
        assert_eq!(body["supervised_campaigns"], 0);
        assert_eq!(body["influx_writes_dropped"], 0);
    }

    #[tokio::test]
    async fn status_of_unknown_campaign_is_404() {
        let resp = build_router(state())
            .oneshot(Request::get("/api/campaigns/99/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_json(resp).await["error"].as_str().unwrap().contains("99"));
    }

    #[tokio::test]
    async fn status_reports_persisted_state() {
        let resp = build_router(state())
            .oneshot(Request::get("/api/campaigns/7/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["state"], "running");
        assert_eq!(body["alive"], false);
    }

    #[tokio::test]
    async fn start_without_script_is_400() {
        let resp = build_router(state())
            .oneshot(Request::post("/api/campaigns/7/start").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stop_marks_campaign_terminated() {
        let state = state();
        let resp = build_router(state.clone())
            .oneshot(Request::post("/api/campaigns/7/stop").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["terminated"], 0);

        let record = state.store.get(7).await.unwrap().unwrap();
        assert!(!record.is_running());
        assert!(record.end_time.is_some());
    }

    #[tokio::test]
    async fn series_without_target_is_400() {
        let resp = build_router(state())
            .oneshot(Request::get("/api/campaigns/7/series").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sse_streams_matching_events_with_kind_as_name() {
        let state = state();
        let resp = build_router(state.clone())
            .oneshot(
                Request::get("/sse/imu?imuid=ab12&campaignTag=7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.hub.subscriber_count(), 1);

        let event = |sensor: &str| {
            Arc::new(TelemetryEvent {
                kind: EventKind::Imu,
                sensor_id: Some(sensor.into()),
                campaign_tag: Some("7".into()),
                fields: Fields::new(),
                source_channel: "aaac/campaign/imu".into(),
                observed_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            })
        };
        state.hub.publish(&event("ZZ99"));
        state.hub.publish(&event("AB12"));

        let mut body = resp.into_body();
        let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
        assert!(text.starts_with("event: imu\n"), "{text}");
        assert!(text.contains("\"sensorId\":\"AB12\""), "{text}");

        drop(body);
        assert_eq!(state.hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_open_live_streams() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let state = state();
        let hub = state.hub.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (trigger_tx, trigger_rx) = tokio::sync::oneshot::channel::<()>();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let shutdown = crate::startup::drain_on(
            async {
                let _ = trigger_rx.await;
            },
            shutdown_tx,
            hub.clone(),
        );
        let server = tokio::spawn(async move {
            axum::serve(listener, build_router(state))
                .with_graceful_shutdown(shutdown)
                .await
        });

        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"GET /sse/imu HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut head = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), conn.read(&mut head))
            .await
            .unwrap()
            .unwrap();
        assert!(head[..n].starts_with(b"HTTP/1.1 200"));
        assert_eq!(hub.subscriber_count(), 1);

        trigger_tx.send(()).unwrap();
        let mut rest = Vec::new();
        let drained = tokio::time::timeout(Duration::from_secs(3), conn.read_to_end(&mut rest)).await;
        assert!(drained.is_ok(), "live stream stayed open after shutdown");

        let stopped = tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("server did not stop after shutdown");
        assert!(stopped.unwrap().is_ok());
        assert!(*shutdown_rx.borrow());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
