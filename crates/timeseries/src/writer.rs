//! Fire-and-forget write path.
//!
//! Live writes are dispatched on the runtime under a fixed number of permits.
//! When every permit is taken the event is dropped rather than queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use bsn_core::{CampaignId, CampaignStore, TelemetryEvent, TelemetrySink};

use crate::error::TimeseriesError;
use crate::line_protocol::{encode, measurement_for};
use crate::target::ResolvedTarget;

/// Result of one write attempt. HTTP failures are logged, never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { campaign_id: CampaignId, line: String },
    /// The event carried no numeric campaign tag.
    NoCampaign,
    /// Unknown campaign, or one without a storage target.
    NoTarget(CampaignId),
    NoFields,
    Failed(String),
}

#[derive(Clone)]
pub struct InfluxWriter {
    client: Client,
    store: Arc<dyn CampaignStore>,
    permits: Arc<Semaphore>,
    dropped: Arc<AtomicU64>,
}

impl InfluxWriter {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        timeout: Duration,
        max_in_flight: usize,
    ) -> Result<Self, TimeseriesError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, store, max_in_flight))
    }

    pub fn with_client(client: Client, store: Arc<dyn CampaignStore>, max_in_flight: usize) -> Self {
        Self {
            client,
            store,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Live writes dropped because the in-flight bound was reached.
    pub fn dropped_writes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolve the campaign behind `event` and write it to that campaign's target.
    pub async fn write(&self, event: &TelemetryEvent) -> WriteOutcome {
        let Some(campaign_id) = event.campaign_id() else {
            return WriteOutcome::NoCampaign;
        };

        let stored = match self.store.get_target(campaign_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(campaign_id, error = %e, "influx write skipped: target lookup failed");
                return WriteOutcome::Failed(e.to_string());
            }
        };

        let Some(target) = stored.as_ref().and_then(ResolvedTarget::from_db_target) else {
            warn!(campaign_id, "influx write skipped: no database configured for campaign");
            return WriteOutcome::NoTarget(campaign_id);
        };

        let Some(line) = encode(event, &measurement_for(campaign_id)) else {
            return WriteOutcome::NoFields;
        };

        match self.write_line(&target, &line).await {
            Ok(()) => WriteOutcome::Written { campaign_id, line },
            Err(e) => {
                warn!(campaign_id, error = %e, "influx write failed");
                WriteOutcome::Failed(e.to_string())
            }
        }
    }

    /// POST one line-protocol body to `target`.
    pub async fn write_line(&self, target: &ResolvedTarget, line: &str) -> Result<(), TimeseriesError> {
        let response = self
            .client
            .post(target.write_url())
            .query(&[("db", target.database.as_str()), ("precision", "ns")])
            .body(line.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            return Err(TimeseriesError::Status { status: status.as_u16(), body });
        }
        debug!(db = %target.database, "influx write ok");
        Ok(())
    }
}

impl TelemetrySink for InfluxWriter {
    /// Dispatches the write on the runtime and returns immediately.
    fn accept(&self, event: Arc<TelemetryEvent>) {
        if event.campaign_id().is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("influx write skipped: no async runtime");
            return;
        };
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped, campaign = ?event.campaign_tag, "influx write dropped: too many writes in flight");
            return;
        };
        let writer = self.clone();
        handle.spawn(async move {
            writer.write(&event).await;
            drop(permit);
        });
    }

    fn name(&self) -> &str {
        "influx-writer"
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bsn_core::{
        BsnResult, CampaignRecord, DbTarget, EventKind, FieldValue, Fields, MemoryCampaignStore,
        RunningCampaign,
    };
    use chrono::Utc;

    use super::*;

    fn event(tag: Option<&str>) -> TelemetryEvent {
        TelemetryEvent {
            kind: EventKind::Imu,
            sensor_id: Some("AB12".into()),
            campaign_tag: tag.map(str::to_string),
            fields: Fields::from_iter([("ax".to_string(), FieldValue::Float(1.0))]),
            source_channel: "t".into(),
            observed_at: Utc::now(),
        }
    }

    fn writer(store: MemoryCampaignStore) -> InfluxWriter {
        InfluxWriter::with_client(Client::new(), Arc::new(store), 4)
    }

    /// Store whose target lookups wait until the gate is opened.
    struct StalledStore {
        gate: Semaphore,
    }

    #[async_trait]
    impl CampaignStore for StalledStore {
        async fn find_running(&self) -> BsnResult<Vec<RunningCampaign>> {
            Ok(Vec::new())
        }
        async fn force_terminate(&self, _: CampaignId, _: &str) -> BsnResult<()> {
            Ok(())
        }
        async fn get_target(&self, _: CampaignId) -> BsnResult<Option<DbTarget>> {
            let _open = self.gate.acquire().await;
            Ok(None)
        }
        async fn get(&self, _: CampaignId) -> BsnResult<Option<CampaignRecord>> {
            Ok(None)
        }
        async fn mark_terminated(&self, _: CampaignId) -> BsnResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_without_numeric_tag_are_skipped() {
        let w = writer(MemoryCampaignStore::new());
        assert_eq!(w.write(&event(None)).await, WriteOutcome::NoCampaign);
        assert_eq!(w.write(&event(Some("walk"))).await, WriteOutcome::NoCampaign);
    }

    #[tokio::test]
    async fn unknown_campaign_is_skipped() {
        let w = writer(MemoryCampaignStore::new());
        assert_eq!(w.write(&event(Some("5"))).await, WriteOutcome::NoTarget(5));
    }

    #[tokio::test]
    async fn campaign_without_target_is_skipped() {
        let store = MemoryCampaignStore::with_campaigns([CampaignRecord::running(5, "walk")]);
        let w = writer(store);
        assert_eq!(w.write(&event(Some("5"))).await, WriteOutcome::NoTarget(5));
    }

    #[tokio::test]
    async fn event_without_fields_is_skipped() {
        let mut c = CampaignRecord::running(5, "walk");
        c.target = DbTarget::from_parts(Some("127.0.0.1:1"), Some("bsn"));
        let w = writer(MemoryCampaignStore::with_campaigns([c]));

        let mut e = event(Some("5"));
        e.fields.clear();
        assert_eq!(w.write(&e).await, WriteOutcome::NoFields);
    }

    #[tokio::test]
    async fn writes_beyond_the_in_flight_bound_are_dropped() {
        let store = Arc::new(StalledStore { gate: Semaphore::new(0) });
        let w = InfluxWriter::with_client(Client::new(), store.clone(), 2);

        for _ in 0..5 {
            w.accept(Arc::new(event(Some("5"))));
        }
        assert_eq!(w.dropped_writes(), 3);

        store.gate.add_permits(16);
        for _ in 0..100 {
            if w.permits.available_permits() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(w.permits.available_permits(), 2);

        w.accept(Arc::new(event(Some("5"))));
        assert_eq!(w.dropped_writes(), 3);
    }
}
