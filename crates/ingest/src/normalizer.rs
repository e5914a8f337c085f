//! Parse raw channel payloads into [`TelemetryEvent`]s.
//!
//! Two wire formats, chosen by sniffing:
//! - **key/value**: `ax=1.5,ay=-2,imuid=ab12,ts=1000` (`:` also accepted as separator)
//! - **positional**: 12 whitespace-separated tokens in the order of
//!   [`POSITIONAL_FIELDS`], optionally preceded by one stray timestamp token

use chrono::{DateTime, Utc};

use bsn_core::{EventKind, Fields, TelemetryEvent};

use crate::values::{field_value, parse_epoch_millis, AXIS_KEYS};

/// Field order of the positional format.
pub const POSITIONAL_FIELDS: [&str; 12] = [
    "ax", "ay", "az", "counter", "gx", "gy", "gz", "imuid", "mx", "my", "mz", "ts",
];

const SENSOR_KEY: &str = "imuid";
const CAMPAIGN_KEY: &str = "cname";
const TIMESTAMP_KEY: &str = "ts";

/// Signature shared by every normalizer the ingestion driver can be given.
pub type NormalizeFn = fn(&str, &str) -> Option<TelemetryEvent>;

/// Normalize one raw payload received on `source_channel`.
///
/// Returns `None` for blank payloads, positional payloads with the wrong token
/// count and key/value payloads that carry no fields.
pub fn normalize(raw: &str, source_channel: &str) -> Option<TelemetryEvent> {
    normalize_at(raw, source_channel, Utc::now())
}

/// Same as [`normalize`] with an explicit ingestion time.
pub fn normalize_at(
    raw: &str,
    source_channel: &str,
    received_at: DateTime<Utc>,
) -> Option<TelemetryEvent> {
    if raw.trim().is_empty() {
        return None;
    }
    if raw.contains('=') || raw.contains(':') {
        parse_key_value(raw, source_channel, received_at)
    } else {
        parse_positional(raw, source_channel, received_at)
    }
}

fn canonical_key(key: &str) -> String {
    let key = key.trim().to_lowercase();
    match key.as_str() {
        "imiid" => SENSOR_KEY.to_string(),
        "nth" => "counter".to_string(),
        _ => key,
    }
}

fn millis_to_time(raw: &str) -> Option<DateTime<Utc>> {
    parse_epoch_millis(raw).and_then(DateTime::from_timestamp_millis)
}

fn parse_key_value(
    raw: &str,
    source_channel: &str,
    received_at: DateTime<Utc>,
) -> Option<TelemetryEvent> {
    let mut fields = Fields::new();
    let mut sensor_id = None;
    let mut campaign_tag = None;
    let mut observed_at = received_at;

    for part in raw.split(',') {
        let token = part.trim();
        if token.is_empty() {
            continue;
        }
        let Some((key, value)) = token.split_once('=').or_else(|| token.split_once(':')) else {
            continue;
        };
        let key = canonical_key(key);
        let value = value.trim();
        if key.is_empty() {
            continue;
        }

        match key.as_str() {
            SENSOR_KEY => sensor_id = Some(value.to_uppercase()),
            CAMPAIGN_KEY => campaign_tag = Some(value.to_string()),
            TIMESTAMP_KEY => {
                if let Some(ts) = millis_to_time(value) {
                    observed_at = ts;
                } else {
                    tracing::debug!(value, "unparsable ts token, keeping ingestion time");
                }
            }
            _ => {
                let parsed = field_value(&key, value);
                fields.insert(key, parsed);
            }
        }
    }

    if fields.is_empty() {
        return None;
    }

    Some(TelemetryEvent {
        kind: resolve_kind(&fields),
        sensor_id,
        campaign_tag,
        fields,
        source_channel: source_channel.to_string(),
        observed_at,
    })
}

fn parse_positional(
    raw: &str,
    source_channel: &str,
    received_at: DateTime<Utc>,
) -> Option<TelemetryEvent> {
    let mut tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() == POSITIONAL_FIELDS.len() + 1 {
        tokens.remove(0);
    }
    if tokens.len() != POSITIONAL_FIELDS.len() {
        return None;
    }

    let mut fields = Fields::new();
    let mut sensor_id = None;
    let mut observed_at = received_at;

    for (key, value) in POSITIONAL_FIELDS.iter().zip(tokens) {
        match *key {
            SENSOR_KEY => sensor_id = Some(value.to_uppercase()),
            TIMESTAMP_KEY => {
                if let Some(ts) = millis_to_time(value) {
                    observed_at = ts;
                }
            }
            _ => {
                fields.insert(key.to_string(), field_value(key, value));
            }
        }
    }

    Some(TelemetryEvent {
        kind: resolve_kind(&fields),
        sensor_id,
        campaign_tag: None,
        fields,
        source_channel: source_channel.to_string(),
        observed_at,
    })
}

/// `imu` when any axis key is present, else `battery` when a battery reading is, else `unknown`.
pub fn resolve_kind(fields: &Fields) -> EventKind {
    if AXIS_KEYS.iter().any(|k| fields.contains_key(*k)) {
        EventKind::Imu
    } else if fields.contains_key("battery") {
        EventKind::Battery
    } else {
        EventKind::Unknown
    }
}
