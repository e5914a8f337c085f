use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignId;

/// Classification of a telemetry reading, also used as the SSE event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Imu,
    Battery,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Imu => "imu",
            EventKind::Battery => "battery",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar field value. Serializes as a bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

pub type Fields = IndexMap<String, FieldValue>;

/// One normalized reading extracted from a raw channel message.
///
/// Built once by the normalizer and shared read-only (behind `Arc`) between
/// the distribution hub and the time-series writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub kind: EventKind,
    /// Upper-cased sensor code (`imuid` on the wire).
    pub sensor_id: Option<String>,
    /// Campaign tag set by the worker (`cname` on the wire).
    pub campaign_tag: Option<String>,
    pub fields: Fields,
    pub source_channel: String,
    pub observed_at: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Numeric campaign id carried by the tag, if the tag is an integer.
    pub fn campaign_id(&self) -> Option<CampaignId> {
        self.campaign_tag
            .as_deref()
            .and_then(|tag| tag.trim().parse::<CampaignId>().ok())
    }
}
