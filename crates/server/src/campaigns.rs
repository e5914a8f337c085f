//! Campaign start/stop orchestration over the store and the supervisor.

use std::sync::Arc;

use tracing::{info, warn};

use bsn_core::config::{MqttConfig, WorkersConfig};
use bsn_core::{BsnError, BsnResult, CampaignId, CampaignRecord, CampaignStore};
use bsn_supervisor::{ProcessSupervisor, SupervisorError, WorkerCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedCampaign {
    pub campaign_id: CampaignId,
    pub pid: Option<u32>,
}

/// Persisted campaign record plus the supervisor's liveness view.
#[derive(Debug, Clone)]
pub struct CampaignStatus {
    pub record: CampaignRecord,
    pub alive: bool,
    pub handles: usize,
}

pub struct CampaignService {
    store: Arc<dyn CampaignStore>,
    supervisor: Arc<ProcessSupervisor>,
    workers: WorkersConfig,
    mqtt: MqttConfig,
}

impl CampaignService {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        supervisor: Arc<ProcessSupervisor>,
        workers: WorkersConfig,
        mqtt: MqttConfig,
    ) -> Self {
        Self {
            store,
            supervisor,
            workers,
            mqtt,
        }
    }

    async fn load(&self, id: CampaignId) -> BsnResult<CampaignRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| BsnError::not_found(format!("campaign {id}")))
    }

    /// Launch the acquisition worker of a running campaign.
    pub async fn start(&self, id: CampaignId) -> BsnResult<StartedCampaign> {
        let campaign = self.load(id).await?;
        if !campaign.is_running() {
            return Err(BsnError::invalid(format!(
                "campaign {id} is {}, not running",
                campaign.state
            )));
        }

        let command = WorkerCommand::for_campaign(&campaign, &self.workers, &self.mqtt)?;
        match self.supervisor.spawn(id, &command) {
            Ok(handle) => {
                info!(campaign_id = id, pid = ?handle.pid(), "campaign worker started");
                Ok(StartedCampaign {
                    campaign_id: id,
                    pid: handle.pid(),
                })
            }
            Err(e @ SupervisorError::AlreadyRunning(_)) => Err(e.into()),
            Err(e) => {
                warn!(campaign_id = id, error = %e, "campaign worker failed to start");
                self.supervisor.terminate(id);
                Err(e.into())
            }
        }
    }

    /// Terminate the campaign's workers and persist the regular termination.
    /// Returns how many processes were signalled.
    pub async fn stop(&self, id: CampaignId) -> BsnResult<usize> {
        let campaign = self.load(id).await?;
        let terminated = self.supervisor.terminate(id);
        if campaign.is_running() {
            self.store.mark_terminated(id).await?;
        }
        info!(campaign_id = id, terminated, "campaign stopped");
        Ok(terminated)
    }

    pub async fn status(&self, id: CampaignId) -> BsnResult<CampaignStatus> {
        let record = self.load(id).await?;
        Ok(CampaignStatus {
            alive: self.supervisor.is_alive(id),
            handles: self.supervisor.handle_count(id),
            record,
        })
    }
}
