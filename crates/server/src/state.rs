use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bsn_core::{CampaignStore, Config};
use bsn_hub::DistributionHub;
use bsn_ingest::IngestionDriver;
use bsn_supervisor::ProcessSupervisor;
use bsn_timeseries::{InfluxQueryClient, InfluxWriter};

use crate::campaigns::CampaignService;

pub struct AppState {
    pub config: Config,
    pub hub: DistributionHub,
    pub store: Arc<dyn CampaignStore>,
    pub series: InfluxQueryClient,
    pub writer: InfluxWriter,
    pub supervisor: Arc<ProcessSupervisor>,
    pub campaigns: CampaignService,
    pub ingest: Arc<IngestionDriver>,
    /// Tracks the broker session; stays `false` when MQTT is disabled.
    pub mqtt_connected: Arc<AtomicBool>,
}
