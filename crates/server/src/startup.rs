//! Server startup: shared state initialization and background task spawning.

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use bsn_core::{CampaignStore, Config, MemoryCampaignStore, TelemetrySink};
use bsn_hub::DistributionHub;
use bsn_ingest::{IngestionDriver, MqttListener};
use bsn_supervisor::{OsLauncher, ProcessSupervisor, Watchdog};
use bsn_timeseries::{InfluxQueryClient, InfluxWriter};

use crate::campaigns::CampaignService;
use crate::state::AppState;
use crate::store::PgCampaignStore;
use crate::{db, router};

const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

async fn campaign_store(config: &Config) -> Arc<dyn CampaignStore> {
    match db::init_pg_pool(&config.postgres).await {
        Some(pool) => Arc::new(PgCampaignStore::new(pool)),
        None => Arc::new(MemoryCampaignStore::new()),
    }
}

/// Build shared state, start the ingestion and watchdog tasks, and serve HTTP
/// until SIGINT/SIGTERM.
pub async fn serve(config: Config, no_mqtt: bool) -> anyhow::Result<()> {
    config.log_summary();

    let store = campaign_store(&config).await;
    let hub = DistributionHub::new(config.stream.buffer);
    let writer = InfluxWriter::new(
        store.clone(),
        config.influx.timeout(),
        config.influx.max_in_flight_writes,
    )?;

    let hub_sink: Arc<dyn TelemetrySink> = Arc::new(hub.clone());
    let writer_sink: Arc<dyn TelemetrySink> = Arc::new(writer.clone());
    let ingest = Arc::new(IngestionDriver::new(vec![hub_sink, writer_sink]));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let mut mqtt_connected = Arc::new(AtomicBool::new(false));
    if config.mqtt.enabled && !no_mqtt {
        match MqttListener::new(&config.mqtt, ingest.clone()) {
            Ok(listener) => {
                mqtt_connected = listener.connected_flag();
                tasks.push(listener.spawn(shutdown_rx.clone()));
            }
            Err(e) => warn!(error = %e, "MQTT listener not started, live ingestion disabled"),
        }
    } else {
        info!("MQTT ingestion disabled");
    }

    let supervisor = Arc::new(ProcessSupervisor::new(Arc::new(OsLauncher)));
    let watchdog = Watchdog::new(store.clone(), supervisor.clone(), config.watchdog.interval());
    tasks.push(watchdog.spawn(shutdown_rx.clone()));

    let series = InfluxQueryClient::new(store.clone(), &config.influx)?;
    let campaigns = CampaignService::new(
        store.clone(),
        supervisor.clone(),
        config.workers.clone(),
        config.mqtt.clone(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let port = config.server.port;

    let shutdown = drain_on(shutdown_signal(), shutdown_tx, hub.clone());
    let state = Arc::new(AppState {
        config,
        hub,
        store,
        series,
        writer,
        supervisor,
        campaigns,
        ingest,
        mqtt_connected,
    });

    let app = router::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://localhost:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    for task in tasks {
        if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task).await.is_err() {
            warn!("background task did not stop in time");
        }
    }
    info!("bsn-server exited cleanly");
    Ok(())
}

/// Resolves once `signal` fires, after background tasks were told to stop and
/// every live viewer stream was ended, so open SSE connections can close.
pub(crate) async fn drain_on(
    signal: impl Future<Output = ()>,
    shutdown_tx: watch::Sender<bool>,
    hub: DistributionHub,
) {
    signal.await;
    info!("shutting down background tasks");
    let _ = shutdown_tx.send(true);
    let viewers = hub.close_all();
    info!(viewers, "live viewers closed");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }

    info!("shutdown signal received");
}
