//! Worker command assembly for a campaign.

use std::path::PathBuf;

use bsn_core::config::{MqttConfig, WorkersConfig};
use bsn_core::CampaignRecord;

use crate::error::SupervisorError;

/// Fully resolved command line for one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment, in insertion order.
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Build the acquisition worker for `campaign`:
    /// `<python> <abs script> <sensorsCsv> <campaignId> 0` plus the `BSN_*` environment.
    pub fn for_campaign(
        campaign: &CampaignRecord,
        workers: &WorkersConfig,
        mqtt: &MqttConfig,
    ) -> Result<Self, SupervisorError> {
        let script_name = campaign
            .script_file_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SupervisorError::InvalidInput(format!("campaign {} has no script", campaign.id))
            })?;

        let script = resolve_script(workers, script_name)?;

        let sensors: Vec<&str> = campaign
            .sensor_codes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if sensors.is_empty() {
            return Err(SupervisorError::InvalidInput(format!(
                "campaign {} has no active sensors",
                campaign.id
            )));
        }
        let sensors_csv = sensors.join(",");
        let id = campaign.id.to_string();

        let mut cmd = WorkerCommand::new(workers.python_command.clone())
            .arg(script.to_string_lossy())
            .arg(sensors_csv.clone())
            .arg(id.clone())
            .arg("0")
            .env("BSN_CAMPAIGN_ID", id);

        if let Some(code) = campaign.type_code.as_deref().filter(|c| !c.trim().is_empty()) {
            cmd = cmd.env("BSN_TYPE_CODE", code);
        }
        cmd = cmd.env("BSN_SENSORS", sensors_csv);

        let (host, port) = mqtt
            .broker_addr()
            .map_err(|e| SupervisorError::InvalidInput(e.to_string()))?;
        cmd = cmd
            .env("BSN_MQTT_BROKER", host)
            .env("BSN_MQTT_PORT", port.to_string());
        if !mqtt.topic.trim().is_empty() {
            cmd = cmd.env("BSN_MQTT_TOPIC", mqtt.topic.clone());
        }
        if let Some(hz) = campaign.sampling_hz {
            cmd = cmd.env("BSN_SAMPLING_HZ", hz.to_string());
        }
        if let Some(mode) = campaign.connectivity.as_deref() {
            cmd = cmd.env("BSN_CONNECTIVITY", mode);
        }
        if let Some(target) = &campaign.target {
            cmd = cmd
                .env("BSN_DB_HOST", target.host.clone())
                .env("BSN_DB_NAME", target.database.clone());
        }
        Ok(cmd)
    }
}

/// Absolute path of `script_name` inside the scripts folder. The file must exist.
fn resolve_script(workers: &WorkersConfig, script_name: &str) -> Result<PathBuf, SupervisorError> {
    let path = workers.scripts_folder.join(script_name);
    if !path.is_file() {
        return Err(SupervisorError::InvalidInput(format!(
            "script not found: {}",
            path.display()
        )));
    }
    path.canonicalize().map_err(SupervisorError::Spawn)
}
