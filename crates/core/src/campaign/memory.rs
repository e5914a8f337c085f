use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{CampaignId, CampaignRecord, CampaignState, CampaignStore, DbTarget, RunningCampaign};
use crate::error::{BsnError, BsnResult};

/// In-process campaign store. Used when PostgreSQL is not configured and in tests.
#[derive(Default)]
pub struct MemoryCampaignStore {
    campaigns: RwLock<BTreeMap<CampaignId, CampaignRecord>>,
}

fn poisoned() -> BsnError {
    BsnError::Store("campaign store lock poisoned".into())
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_campaigns(campaigns: impl IntoIterator<Item = CampaignRecord>) -> Self {
        let store = Self::new();
        for c in campaigns {
            store.insert(c);
        }
        store
    }

    /// Insert or replace a campaign.
    pub fn insert(&self, campaign: CampaignRecord) {
        if let Ok(mut map) = self.campaigns.write() {
            map.insert(campaign.id, campaign);
        }
    }

    /// Snapshot of a single campaign.
    pub fn snapshot(&self, id: CampaignId) -> Option<CampaignRecord> {
        self.campaigns.read().ok()?.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.campaigns.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn find_running(&self) -> BsnResult<Vec<RunningCampaign>> {
        let map = self.campaigns.read().map_err(|_| poisoned())?;
        Ok(map
            .values()
            .filter(|c| c.is_running())
            .map(|c| RunningCampaign {
                id: c.id,
                start_time: c.start_time,
                target: c.target.clone(),
            })
            .collect())
    }

    async fn force_terminate(&self, id: CampaignId, note: &str) -> BsnResult<()> {
        let mut map = self.campaigns.write().map_err(|_| poisoned())?;
        let campaign = map
            .get_mut(&id)
            .ok_or_else(|| BsnError::not_found(format!("campaign {id}")))?;
        campaign.state = CampaignState::Terminated;
        campaign.end_time = Some(Utc::now());
        campaign.append_note(note);
        Ok(())
    }

    async fn get_target(&self, id: CampaignId) -> BsnResult<Option<DbTarget>> {
        let map = self.campaigns.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).and_then(|c| c.target.clone()))
    }

    async fn get(&self, id: CampaignId) -> BsnResult<Option<CampaignRecord>> {
        let map = self.campaigns.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }

    async fn mark_terminated(&self, id: CampaignId) -> BsnResult<()> {
        let mut map = self.campaigns.write().map_err(|_| poisoned())?;
        let campaign = map
            .get_mut(&id)
            .ok_or_else(|| BsnError::not_found(format!("campaign {id}")))?;
        campaign.state = CampaignState::Terminated;
        campaign.end_time = Some(Utc::now());
        Ok(())
    }
}
