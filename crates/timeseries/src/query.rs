//! Historical range queries over a campaign's measurement.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use bsn_core::config::InfluxConfig;
use bsn_core::{CampaignId, CampaignStore, FieldValue};

use crate::error::TimeseriesError;
use crate::target::ResolvedTarget;

pub const DEFAULT_LIMIT: i64 = 1000;
pub const MAX_LIMIT: i64 = 5000;
pub const DEFAULT_MEASUREMENT: &str = "campaign";

/// Caller-supplied query parameters, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesQuery {
    pub measurement: Option<String>,
    /// Comma-separated sensor codes.
    pub sensor_ids: Option<String>,
    pub limit: Option<i64>,
    /// Offset in seconds from the campaign start.
    pub from_seconds: Option<i64>,
    pub db_host: Option<String>,
    pub db_name: Option<String>,
}

/// Tabular query result. Cells are `null` where the series has no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesTable {
    pub campaign_id: CampaignId,
    pub measurement: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<FieldValue>>>,
}

fn is_safe_name(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Measurement for `campaign_id`: defaults to `campaign`, then `_<id>` is
/// appended unless already present.
pub fn resolve_measurement(
    measurement: Option<&str>,
    campaign_id: CampaignId,
) -> Result<String, TimeseriesError> {
    let base = measurement
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MEASUREMENT);
    if !is_safe_name(base) {
        return Err(TimeseriesError::InvalidInput(format!("invalid measurement: {base}")));
    }
    let suffix = format!("_{campaign_id}");
    if base.ends_with(&suffix) {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}{suffix}"))
    }
}

pub fn normalize_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

/// Upper-cased, deduplicated sensor codes; unsafe tokens are dropped.
pub fn normalize_sensor_ids(csv: Option<&str>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for raw in csv.unwrap_or_default().split(',') {
        let id = raw.trim().to_uppercase();
        if is_safe_name(&id) && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Lower time bound: campaign start plus `offset` seconds. Negative offsets
/// clamp to the start; offsets that overflow the timestamp range are rejected.
pub fn start_bound(
    offset: Option<i64>,
    started: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, TimeseriesError> {
    let (Some(offset), Some(started)) = (offset, started) else {
        return Ok(None);
    };
    chrono::Duration::try_seconds(offset.max(0))
        .and_then(|delta| started.checked_add_signed(delta))
        .map(Some)
        .ok_or_else(|| TimeseriesError::InvalidInput(format!("fromSeconds out of range: {offset}")))
}

/// Build the InfluxQL statement. Ascending from `start` when a lower bound is
/// given, otherwise most recent first.
pub fn build_query(
    measurement: &str,
    sensor_ids: &[String],
    limit: i64,
    start: Option<DateTime<Utc>>,
) -> String {
    let mut q = format!("SELECT * FROM {measurement}");
    let mut has_where = false;

    if let Some(start) = start {
        q.push_str(&format!(
            " WHERE time >= '{}'",
            start.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ));
        has_where = true;
    }

    if !sensor_ids.is_empty() {
        q.push_str(if has_where { " AND " } else { " WHERE " });
        q.push_str(&format!("imuid =~ /^(?:{})$/", sensor_ids.join("|")));
    }

    let order = if start.is_some() { "ASC" } else { "DESC" };
    q.push_str(&format!(" ORDER BY time {order} LIMIT {limit}"));
    q
}

fn to_cell(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        Value::Number(n) => {
            if n.is_f64() {
                n.as_f64().map(FieldValue::Float)
            } else if let Some(i) = n.as_i64() {
                Some(FieldValue::Integer(i))
            } else {
                n.as_f64().map(FieldValue::Float)
            }
        }
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        other => Some(FieldValue::Text(other.to_string())),
    }
}

/// Map a `/query` response body onto a table. Missing series give an empty table.
pub fn parse_response(campaign_id: CampaignId, measurement: &str, body: &Value) -> SeriesTable {
    let series = body
        .get("results")
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("series"))
        .and_then(|s| s.get(0));

    let columns = series
        .and_then(|s| s.get("columns"))
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let rows = series
        .and_then(|s| s.get("values"))
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(to_cell).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default();

    SeriesTable {
        campaign_id,
        measurement: measurement.to_string(),
        columns,
        rows,
    }
}

/// Read path. Failures are returned to the caller.
pub struct InfluxQueryClient {
    client: Client,
    store: Arc<dyn CampaignStore>,
    fallback_url: Option<String>,
    fallback_database: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

fn first_non_blank<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl InfluxQueryClient {
    pub fn new(store: Arc<dyn CampaignStore>, config: &InfluxConfig) -> Result<Self, TimeseriesError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_client(client, store, config))
    }

    pub fn with_client(client: Client, store: Arc<dyn CampaignStore>, config: &InfluxConfig) -> Self {
        Self {
            client,
            store,
            fallback_url: config.url.clone(),
            fallback_database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    pub async fn query_campaign_series(
        &self,
        campaign_id: CampaignId,
        params: &SeriesQuery,
    ) -> Result<SeriesTable, TimeseriesError> {
        let campaign = self
            .store
            .get(campaign_id)
            .await
            .map_err(TimeseriesError::Store)?
            .ok_or_else(|| TimeseriesError::NotFound(format!("campaign {campaign_id}")))?;

        let measurement = resolve_measurement(params.measurement.as_deref(), campaign_id)?;
        let limit = normalize_limit(params.limit);
        let sensor_ids = normalize_sensor_ids(params.sensor_ids.as_deref());

        let start = start_bound(params.from_seconds, campaign.start_time)?;

        let stored = campaign.target.as_ref();
        let host = first_non_blank([
            params.db_host.as_deref(),
            stored.map(|t| t.host.as_str()),
            self.fallback_url.as_deref(),
        ])
        .ok_or_else(|| TimeseriesError::InvalidInput("influx host not configured".into()))?;
        let database = first_non_blank([
            params.db_name.as_deref(),
            stored.map(|t| t.database.as_str()),
            self.fallback_database.as_deref(),
        ])
        .ok_or_else(|| TimeseriesError::InvalidInput("influx database not configured".into()))?;
        let target = ResolvedTarget::from_parts(host, database)
            .ok_or_else(|| TimeseriesError::InvalidInput("influx target not configured".into()))?;

        let q = build_query(&measurement, &sensor_ids, limit, start);
        debug!(campaign_id, query = %q, "influx query");

        let body = self.run(&target, &q).await?;
        Ok(parse_response(campaign_id, &measurement, &body))
    }

    async fn run(&self, target: &ResolvedTarget, q: &str) -> Result<Value, TimeseriesError> {
        let mut params: Vec<(&str, &str)> = vec![("db", target.database.as_str()), ("q", q)];
        if let Some(user) = self.user.as_deref().filter(|u| !u.trim().is_empty()) {
            params.push(("u", user));
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.trim().is_empty()) {
            params.push(("p", password));
        }

        let response = self.client.get(target.query_url()).query(&params).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status.as_u16() >= 300 {
            return Err(TimeseriesError::Status { status: status.as_u16(), body: text });
        }
        serde_json::from_str(&text).map_err(|e| TimeseriesError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn measurement_gets_campaign_suffix_once() {
        assert_eq!(resolve_measurement(None, 7).unwrap(), "campaign_7");
        assert_eq!(resolve_measurement(Some("  "), 7).unwrap(), "campaign_7");
        assert_eq!(resolve_measurement(Some("campaign_7"), 7).unwrap(), "campaign_7");
        assert_eq!(resolve_measurement(Some("imu"), 7).unwrap(), "imu_7");
    }

    #[test]
    fn unsafe_measurement_is_rejected() {
        for bad in ["drop;table", "a b", "x/*", "m\"q"] {
            assert!(matches!(
                resolve_measurement(Some(bad), 1),
                Err(TimeseriesError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(normalize_limit(None), 1000);
        assert_eq!(normalize_limit(Some(0)), 1000);
        assert_eq!(normalize_limit(Some(-5)), 1000);
        assert_eq!(normalize_limit(Some(50_000)), 5000);
        assert_eq!(normalize_limit(Some(250)), 250);
    }

    #[test]
    fn sensor_ids_are_filtered_and_deduplicated() {
        let ids = normalize_sensor_ids(Some(" ab12,AB12, cd-34 ,ef56,, /x/"));
        assert_eq!(ids, vec!["AB12".to_string(), "EF56".to_string()]);
        assert!(normalize_sensor_ids(None).is_empty());
    }

    #[test]
    fn query_without_offset_is_descending() {
        let q = build_query("campaign_7", &[], 1000, None);
        assert_eq!(q, "SELECT * FROM campaign_7 ORDER BY time DESC LIMIT 1000");
    }

    #[test]
    fn query_with_offset_is_ascending_from_start() {
        let start = DateTime::parse_from_rfc3339("2024-03-01T10:00:30Z").unwrap().with_timezone(&Utc);
        let ids = vec!["AB12".to_string(), "CD34".to_string()];
        let q = build_query("campaign_7", &ids, 50, Some(start));
        assert_eq!(
            q,
            "SELECT * FROM campaign_7 WHERE time >= '2024-03-01T10:00:30Z' \
             AND imuid =~ /^(?:AB12|CD34)$/ ORDER BY time ASC LIMIT 50"
        );
    }

    #[test]
    fn start_bound_clamps_negative_offset_to_campaign_start() {
        let started = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(start_bound(Some(-30), Some(started)).unwrap(), Some(started));
        assert_eq!(
            start_bound(Some(90), Some(started)).unwrap(),
            Some(started + chrono::Duration::seconds(90))
        );
        assert_eq!(start_bound(None, Some(started)).unwrap(), None);
        assert_eq!(start_bound(Some(90), None).unwrap(), None);
    }

    #[test]
    fn start_bound_rejects_overflowing_offset() {
        let started = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc);
        for offset in [10_000_000_000_000, i64::MAX] {
            assert!(matches!(
                start_bound(Some(offset), Some(started)),
                Err(TimeseriesError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn sensor_clause_without_time_bound_opens_where() {
        let q = build_query("m_1", &["AB12".to_string()], 10, None);
        assert_eq!(q, "SELECT * FROM m_1 WHERE imuid =~ /^(?:AB12)$/ ORDER BY time DESC LIMIT 10");
    }

    #[test]
    fn response_cells_are_coerced() {
        let body = json!({
            "results": [{
                "series": [{
                    "name": "campaign_7",
                    "columns": ["time", "ax", "counter", "ok", "imuid", "gap"],
                    "values": [["2024-03-01T10:00:30Z", 1.5, 3, true, "AB12", null]]
                }]
            }]
        });
        let table = parse_response(7, "campaign_7", &body);
        assert_eq!(table.columns.len(), 6);
        assert_eq!(
            table.rows[0],
            vec![
                Some(FieldValue::Text("2024-03-01T10:00:30Z".into())),
                Some(FieldValue::Float(1.5)),
                Some(FieldValue::Integer(3)),
                Some(FieldValue::Boolean(true)),
                Some(FieldValue::Text("AB12".into())),
                None,
            ]
        );
    }

    #[test]
    fn missing_series_is_an_empty_table() {
        let table = parse_response(7, "campaign_7", &json!({"results": [{"statement_id": 0}]}));
        assert!(table.columns.is_empty());
        assert!(table.rows.is_empty());
        assert_eq!(table.measurement, "campaign_7");
        assert!(parse_response(7, "m", &json!({})).rows.is_empty());
    }
}
