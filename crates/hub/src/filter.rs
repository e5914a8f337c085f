use std::collections::HashSet;

use bsn_core::TelemetryEvent;

/// Per-viewer acceptance rule. Absent criteria accept everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberFilter {
    /// Upper-cased sensor codes.
    sensors: Option<HashSet<String>>,
    /// Trimmed campaign tag, compared case-insensitively.
    campaign: Option<String>,
}

impl SubscriberFilter {
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Normalize raw criteria: sensor codes are trimmed and upper-cased, blank
    /// entries dropped; an empty sensor set or blank campaign means no filter.
    pub fn new<I, S>(sensors: Option<I>, campaign: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sensors = sensors
            .map(|items| {
                items
                    .into_iter()
                    .map(|s| s.as_ref().trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect::<HashSet<_>>()
            })
            .filter(|set| !set.is_empty());
        let campaign = campaign
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Self { sensors, campaign }
    }

    /// Build from query parameters: a comma-separated sensor list and a campaign tag.
    pub fn from_params(sensor_csv: Option<&str>, campaign: Option<&str>) -> Self {
        Self::new(sensor_csv.map(|csv| csv.split(',')), campaign)
    }

    pub fn sensors(&self) -> Option<&HashSet<String>> {
        self.sensors.as_ref()
    }

    pub fn campaign(&self) -> Option<&str> {
        self.campaign.as_deref()
    }

    pub fn matches(&self, event: &TelemetryEvent) -> bool {
        if let Some(sensors) = &self.sensors {
            match event.sensor_id.as_deref() {
                Some(id) if sensors.contains(&id.to_uppercase()) => {}
                _ => return false,
            }
        }
        if let Some(campaign) = &self.campaign {
            match event.campaign_tag.as_deref() {
                Some(tag) if tag.eq_ignore_ascii_case(campaign) => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use bsn_core::{EventKind, Fields};
    use chrono::Utc;

    use super::*;

    fn event(sensor: Option<&str>, tag: Option<&str>) -> TelemetryEvent {
        TelemetryEvent {
            kind: EventKind::Imu,
            sensor_id: sensor.map(str::to_string),
            campaign_tag: tag.map(str::to_string),
            fields: Fields::new(),
            source_channel: "t".into(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn csv_is_trimmed_and_upper_cased() {
        let f = SubscriberFilter::from_params(Some(" ab12, cd34 ,,"), None);
        let sensors = f.sensors().unwrap();
        assert_eq!(sensors.len(), 2);
        assert!(sensors.contains("AB12"));
        assert!(sensors.contains("CD34"));
    }

    #[test]
    fn blank_criteria_mean_no_filter() {
        let f = SubscriberFilter::from_params(Some("  "), Some("   "));
        assert_eq!(f, SubscriberFilter::accept_all());
        assert!(f.matches(&event(None, None)));
    }

    #[test]
    fn sensor_filter_is_case_insensitive() {
        let f = SubscriberFilter::from_params(Some("ab12"), None);
        assert!(f.matches(&event(Some("AB12"), None)));
        assert!(f.matches(&event(Some("ab12"), None)));
        assert!(!f.matches(&event(Some("EF56"), None)));
        assert!(!f.matches(&event(None, None)));
    }

    #[test]
    fn campaign_filter_is_case_insensitive() {
        let f = SubscriberFilter::from_params(None, Some(" Walk-7 "));
        assert!(f.matches(&event(Some("X"), Some("walk-7"))));
        assert!(!f.matches(&event(Some("X"), Some("walk-8"))));
        assert!(!f.matches(&event(Some("X"), None)));
    }

    #[test]
    fn both_criteria_must_hold() {
        let f = SubscriberFilter::from_params(Some("AB12"), Some("7"));
        assert!(f.matches(&event(Some("AB12"), Some("7"))));
        assert!(!f.matches(&event(Some("AB12"), Some("8"))));
        assert!(!f.matches(&event(Some("CD34"), Some("7"))));
    }
}
