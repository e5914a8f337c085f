//! InfluxDB line-protocol serialization.
//!
//! `measurement[,tag=value...] field=value[,field=value...] timestamp_ns`

use bsn_core::{CampaignId, FieldValue, TelemetryEvent};
use chrono::{DateTime, Utc};

/// Measurement written for a campaign. Always derived from the numeric id.
pub fn measurement_for(campaign_id: CampaignId) -> String {
    format!("campaign_{campaign_id}")
}

/// Escape a tag key or value: space, comma and `=` get a backslash.
pub fn escape_tag(value: &str) -> String {
    escape(value, &[' ', ',', '='])
}

/// Escape a field key: space and comma get a backslash.
pub fn escape_field_key(value: &str) -> String {
    escape(value, &[' ', ','])
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render one field value, or `None` when it cannot be written
/// (non-finite floats, blank strings).
pub fn format_field_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Integer(v) => Some(format!("{v}i")),
        FieldValue::Float(v) if v.is_finite() => Some(v.to_string()),
        FieldValue::Float(_) => None,
        FieldValue::Boolean(b) => Some(b.to_string()),
        FieldValue::Text(s) if s.trim().is_empty() => None,
        FieldValue::Text(s) => Some(format!("\"{}\"", s.replace('"', "\\\""))),
    }
}

fn timestamp_ns(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .or_else(|| Utc::now().timestamp_nanos_opt())
        .unwrap_or_default()
}

/// Serialize `event` as one record. `None` when no field survives formatting.
pub fn encode(event: &TelemetryEvent, measurement: &str) -> Option<String> {
    let fields: Vec<String> = event
        .fields
        .iter()
        .filter_map(|(k, v)| format_field_value(v).map(|v| format!("{}={}", escape_field_key(k), v)))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = String::from(measurement);
    let tags = [
        ("imuid", event.sensor_id.as_deref()),
        ("cname", event.campaign_tag.as_deref()),
        ("topic", Some(event.source_channel.as_str())),
    ];
    for (key, value) in tags {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }
    }

    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&timestamp_ns(event.observed_at).to_string());
    Some(line)
}

#[cfg(test)]
mod tests {
    use bsn_core::{EventKind, Fields};

    use super::*;

    fn event(fields: Fields) -> TelemetryEvent {
        TelemetryEvent {
            kind: EventKind::Imu,
            sensor_id: Some("AB12".into()),
            campaign_tag: Some("42".into()),
            fields,
            source_channel: "aaac/campaign/imu".into(),
            observed_at: DateTime::from_timestamp_millis(1_000).unwrap(),
        }
    }

    #[test]
    fn full_record() {
        let mut fields = Fields::new();
        fields.insert("ax".into(), FieldValue::Float(1.5));
        fields.insert("counter".into(), FieldValue::Integer(7));
        fields.insert("ok".into(), FieldValue::Boolean(true));
        fields.insert("note".into(), FieldValue::Text("say \"hi\"".into()));

        let line = encode(&event(fields), "campaign_42").unwrap();
        assert_eq!(
            line,
            "campaign_42,imuid=AB12,cname=42,topic=aaac/campaign/imu \
             ax=1.5,counter=7i,ok=true,note=\"say \\\"hi\\\"\" 1000000000"
        );
    }

    #[test]
    fn tag_values_are_escaped() {
        let mut e = event(Fields::from_iter([("ax".to_string(), FieldValue::Float(0.5))]));
        e.campaign_tag = Some("walk, fast=1".into());
        let line = encode(&e, "campaign_1").unwrap();
        assert!(line.contains(r"cname=walk\,\ fast\=1"), "{line}");
    }

    #[test]
    fn non_finite_and_blank_fields_are_dropped() {
        let mut fields = Fields::new();
        fields.insert("ax".into(), FieldValue::Float(f64::NAN));
        fields.insert("ay".into(), FieldValue::Float(f64::INFINITY));
        fields.insert("label".into(), FieldValue::Text("  ".into()));
        fields.insert("az".into(), FieldValue::Float(-0.25));

        let line = encode(&event(fields), "campaign_42").unwrap();
        assert!(line.contains(" az=-0.25 "), "{line}");
        assert!(!line.contains("ax="));
        assert!(!line.contains("ay="));
        assert!(!line.contains("label="));
    }

    #[test]
    fn no_surviving_fields_means_no_record() {
        let mut fields = Fields::new();
        fields.insert("ax".into(), FieldValue::Float(f64::NAN));
        assert_eq!(encode(&event(fields), "campaign_42"), None);
        assert_eq!(encode(&event(Fields::new()), "campaign_42"), None);
    }

    #[test]
    fn blank_tags_are_omitted() {
        let mut e = event(Fields::from_iter([("ax".to_string(), FieldValue::Integer(1))]));
        e.sensor_id = None;
        e.campaign_tag = Some(" ".into());
        let line = encode(&e, "campaign_9").unwrap();
        assert!(line.starts_with("campaign_9,topic=aaac/campaign/imu ax=1i "), "{line}");
    }

    #[test]
    fn field_keys_escape_space_and_comma_only() {
        assert_eq!(escape_field_key("a b,c=d"), r"a\ b\,c=d");
        assert_eq!(escape_tag("a b,c=d"), r"a\ b\,c\=d");
    }
}
