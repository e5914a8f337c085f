//! Periodic reconciliation of persisted campaign state against worker liveness.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use bsn_core::{CampaignId, CampaignStore};

use crate::registry::ProcessSupervisor;

/// Audit note appended to campaigns closed by the watchdog.
pub const WATCHDOG_NOTE: &str =
    "[SYSTEM]: Terminated automatically by watchdog: no live processes.";

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub inspected: usize,
    pub terminated: Vec<CampaignId>,
    /// Corrections that failed to persist; retried next tick.
    pub failed: Vec<CampaignId>,
}

pub struct Watchdog {
    store: Arc<dyn CampaignStore>,
    supervisor: Arc<ProcessSupervisor>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        supervisor: Arc<ProcessSupervisor>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            supervisor,
            interval,
        }
    }

    /// Inspect every persisted running campaign once and force-close those
    /// without a live worker. Never fails: store errors are logged.
    pub async fn tick(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let running = match self.store.find_running().await {
            Ok(running) => running,
            Err(e) => {
                warn!(error = %e, "watchdog could not list running campaigns");
                return report;
            }
        };

        for campaign in running {
            report.inspected += 1;
            if self.supervisor.is_alive(campaign.id) {
                continue;
            }

            error!(
                campaign_id = campaign.id,
                started_at = ?campaign.start_time,
                db_host = campaign.target.as_ref().map(|t| t.host.as_str()),
                db_name = campaign.target.as_ref().map(|t| t.database.as_str()),
                "campaign persisted as running has no live processes, forcing termination"
            );
            match self.store.force_terminate(campaign.id, WATCHDOG_NOTE).await {
                Ok(()) => {
                    self.supervisor.cleanup(campaign.id);
                    report.terminated.push(campaign.id);
                }
                Err(e) => {
                    warn!(campaign_id = campaign.id, error = %e, "forced termination failed, retrying next tick");
                    report.failed.push(campaign.id);
                }
            }
        }

        debug!(
            inspected = report.inspected,
            terminated = report.terminated.len(),
            failed = report.failed.len(),
            "watchdog sweep complete"
        );
        report
    }

    /// Sweep on a fixed interval until `shutdown` flips to `true`.
    /// Each sweep is awaited before the next tick is taken, so sweeps never overlap.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "watchdog started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("watchdog stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bsn_core::{
        BsnError, BsnResult, CampaignRecord, CampaignState, DbTarget, MemoryCampaignStore,
        RunningCampaign,
    };

    use super::*;
    use crate::registry::tests::{FakeLauncher, FakeProcess};

    /// Fails `force_terminate` for the first `failures` calls.
    struct FlakyStore {
        inner: MemoryCampaignStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl CampaignStore for FlakyStore {
        async fn find_running(&self) -> BsnResult<Vec<RunningCampaign>> {
            self.inner.find_running().await
        }

        async fn force_terminate(&self, id: CampaignId, note: &str) -> BsnResult<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BsnError::Store("connection reset".into()));
            }
            self.inner.force_terminate(id, note).await
        }

        async fn get_target(&self, id: CampaignId) -> BsnResult<Option<DbTarget>> {
            self.inner.get_target(id).await
        }

        async fn get(&self, id: CampaignId) -> BsnResult<Option<CampaignRecord>> {
            self.inner.get(id).await
        }

        async fn mark_terminated(&self, id: CampaignId) -> BsnResult<()> {
            self.inner.mark_terminated(id).await
        }
    }

    fn supervisor() -> Arc<ProcessSupervisor> {
        Arc::new(ProcessSupervisor::new(Arc::new(FakeLauncher::default())))
    }

    #[tokio::test]
    async fn dead_campaign_is_force_terminated() {
        let store = Arc::new(MemoryCampaignStore::with_campaigns([
            CampaignRecord::running(1, "dead"),
            CampaignRecord::running(2, "alive"),
        ]));
        let sup = supervisor();
        sup.register(2, Arc::new(FakeProcess::default()));
        let stale = Arc::new(FakeProcess::default());
        stale.dead.store(true, Ordering::SeqCst);
        sup.register(1, stale);

        let watchdog = Watchdog::new(store.clone(), sup.clone(), Duration::from_secs(30));
        let report = watchdog.tick().await;

        assert_eq!(report.inspected, 2);
        assert_eq!(report.terminated, vec![1]);

        let dead = store.snapshot(1).unwrap();
        assert_eq!(dead.state, CampaignState::Terminated);
        assert!(dead.end_time.is_some());
        assert!(dead.notes.as_deref().unwrap().ends_with(WATCHDOG_NOTE));
        assert_eq!(sup.handle_count(1), 0);

        let alive = store.snapshot(2).unwrap();
        assert_eq!(alive.state, CampaignState::Running);
        assert!(alive.end_time.is_none());
    }

    #[tokio::test]
    async fn terminated_campaigns_are_not_inspected() {
        let mut done = CampaignRecord::running(5, "done");
        done.state = CampaignState::Terminated;
        let store = Arc::new(MemoryCampaignStore::with_campaigns([done]));

        let report = Watchdog::new(store.clone(), supervisor(), Duration::from_secs(30))
            .tick()
            .await;

        assert_eq!(report, SweepReport::default());
        assert!(store.snapshot(5).unwrap().notes.is_none());
    }

    #[tokio::test]
    async fn failed_correction_is_retried_next_tick() {
        let store = Arc::new(FlakyStore {
            inner: MemoryCampaignStore::with_campaigns([
                CampaignRecord::running(1, "a"),
                CampaignRecord::running(2, "b"),
            ]),
            failures: AtomicUsize::new(1),
        });
        let watchdog = Watchdog::new(store.clone(), supervisor(), Duration::from_secs(30));

        let first = watchdog.tick().await;
        assert_eq!(first.failed.len(), 1);
        assert_eq!(first.terminated.len(), 1);

        let second = watchdog.tick().await;
        assert_eq!(second.inspected, 1);
        assert_eq!(second.terminated, first.failed);
        assert!(store.inner.find_running().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweeps_until_shutdown() {
        let store = Arc::new(MemoryCampaignStore::with_campaigns([CampaignRecord::running(
            3, "crashed",
        )]));
        let (tx, rx) = watch::channel(false);
        let handle = Watchdog::new(store.clone(), supervisor(), Duration::from_secs(30)).spawn(rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.snapshot(3).unwrap().state, CampaignState::Terminated);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
