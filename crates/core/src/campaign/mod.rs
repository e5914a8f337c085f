//! Campaign model and the persistence collaborator interface.
//!
//! The core never owns campaign persistence. It reads running campaigns and
//! storage targets through [`CampaignStore`] and asks the store to apply
//! lifecycle transitions.

mod memory;

pub use memory::MemoryCampaignStore;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BsnResult;

/// Database primary key of a campaign.
pub type CampaignId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    Running,
    Terminated,
}

impl CampaignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignState::Running => "running",
            CampaignState::Terminated => "terminated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Some(CampaignState::Running),
            "terminated" => Some(CampaignState::Terminated),
            _ => None,
        }
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-series connection target configured for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbTarget {
    pub host: String,
    pub database: String,
}

impl DbTarget {
    /// Build a target from optional parts. Blank host or database yields `None`.
    pub fn from_parts(host: Option<&str>, database: Option<&str>) -> Option<Self> {
        let host = host.map(str::trim).filter(|h| !h.is_empty())?;
        let database = database.map(str::trim).filter(|d| !d.is_empty())?;
        Some(Self {
            host: host.to_string(),
            database: database.to_string(),
        })
    }
}

/// Full persisted campaign, as needed to launch its worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: CampaignId,
    pub name: String,
    pub state: CampaignState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub target: Option<DbTarget>,
    pub script_file_name: Option<String>,
    pub type_code: Option<String>,
    /// Codes of the active sensors, in association order.
    pub sensor_codes: Vec<String>,
    pub sampling_hz: Option<i32>,
    pub connectivity: Option<String>,
}

impl CampaignRecord {
    /// A running campaign with no worker configuration, mostly for tests.
    pub fn running(id: CampaignId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: CampaignState::Running,
            start_time: Some(Utc::now()),
            end_time: None,
            notes: None,
            target: None,
            script_file_name: None,
            type_code: None,
            sensor_codes: Vec::new(),
            sampling_hz: None,
            connectivity: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == CampaignState::Running
    }

    /// Append a line to the notes, keeping existing text.
    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }
}

/// Projection returned by [`CampaignStore::find_running`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningCampaign {
    pub id: CampaignId,
    pub start_time: Option<DateTime<Utc>>,
    pub target: Option<DbTarget>,
}

/// Campaign persistence, consulted by the watchdog, the time-series adapter
/// and the campaign start/stop flow.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// All campaigns currently persisted as running.
    async fn find_running(&self) -> BsnResult<Vec<RunningCampaign>>;

    /// Move a running campaign to terminated, stamp its end time and append `note`.
    async fn force_terminate(&self, id: CampaignId, note: &str) -> BsnResult<()>;

    /// Storage target configured for the campaign, if any.
    async fn get_target(&self, id: CampaignId) -> BsnResult<Option<DbTarget>>;

    async fn get(&self, id: CampaignId) -> BsnResult<Option<CampaignRecord>>;

    /// Regular (user-requested) termination: state and end time only.
    async fn mark_terminated(&self, id: CampaignId) -> BsnResult<()>;
}
