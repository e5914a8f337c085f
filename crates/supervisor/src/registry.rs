//! Per-campaign registry of worker process handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use bsn_core::CampaignId;

use crate::command::WorkerCommand;
use crate::error::SupervisorError;
use crate::handle::ProcessHandle;
use crate::launcher::ProcessLauncher;

type Registry = HashMap<CampaignId, Vec<Arc<dyn ProcessHandle>>>;

/// Owns every worker handle. An entry with no live handle counts as not running.
pub struct ProcessSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    registry: Mutex<Registry>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            registry: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Launch a worker for `campaign_id` and register it.
    ///
    /// Fails with [`SupervisorError::AlreadyRunning`] without launching when a
    /// live handle is already registered. The check and the insert happen
    /// under one lock so concurrent starts cannot both pass.
    pub fn spawn(
        &self,
        campaign_id: CampaignId,
        command: &WorkerCommand,
    ) -> Result<Arc<dyn ProcessHandle>, SupervisorError> {
        let mut registry = self.lock();
        if any_alive(registry.get(&campaign_id)) {
            return Err(SupervisorError::AlreadyRunning(campaign_id));
        }

        let handle = self.launcher.launch(command)?;
        registry
            .entry(campaign_id)
            .or_default()
            .push(Arc::clone(&handle));
        info!(campaign_id, pid = ?handle.pid(), "worker registered");
        Ok(handle)
    }

    /// Add an externally started handle.
    pub fn register(&self, campaign_id: CampaignId, handle: Arc<dyn ProcessHandle>) {
        self.lock().entry(campaign_id).or_default().push(handle);
    }

    pub fn is_alive(&self, campaign_id: CampaignId) -> bool {
        any_alive(self.lock().get(&campaign_id))
    }

    /// Signal every live handle of `campaign_id`, then drop the entry whatever
    /// the outcome. Returns how many handles were signalled.
    pub fn terminate(&self, campaign_id: CampaignId) -> usize {
        let handles = self.lock().remove(&campaign_id).unwrap_or_default();

        let mut terminated = 0;
        for handle in handles.iter().filter(|h| h.is_alive()) {
            if handle.terminate() {
                terminated += 1;
            } else {
                warn!(campaign_id, pid = ?handle.pid(), "termination request failed");
            }
        }
        info!(campaign_id, terminated, "terminated worker processes");
        terminated
    }

    /// Forget the handles of `campaign_id` without touching the processes.
    pub fn cleanup(&self, campaign_id: CampaignId) -> bool {
        self.lock().remove(&campaign_id).is_some()
    }

    pub fn handle_count(&self, campaign_id: CampaignId) -> usize {
        self.lock().get(&campaign_id).map_or(0, Vec::len)
    }

    /// Number of campaigns with at least one registered handle.
    pub fn campaign_count(&self) -> usize {
        self.lock().values().filter(|h| !h.is_empty()).count()
    }
}

fn any_alive(handles: Option<&Vec<Arc<dyn ProcessHandle>>>) -> bool {
    handles.is_some_and(|hs| hs.iter().any(|h| h.is_alive()))
}
