//! Backend health reporting.
//!
//! The backend exposes the current state of its components at
//! `/api/status` and a history of state changes at `/api/status/logs`.
//! Uptime is derived from that history.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SERVER_COMPONENT: &str = "server";
pub const DATABASE_COMPONENT: &str = "database";

/// Status value the backend uses for a healthy component.
const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub server: String,
    pub database: String,
}

impl SystemStatus {
    pub fn is_healthy(&self) -> bool {
        self.server == STATUS_OK && self.database == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLog {
    pub id: i64,
    pub component: String,
    pub status: String,
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
}

impl StatusLog {
    pub fn is_up(&self) -> bool {
        self.status == STATUS_OK
    }

    /// RFC 3339, or the backend's zone-less `LocalDateTime` form read as UTC.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Percentage of the logged time span during which the component was up.
///
/// Downtime runs from the first non-OK entry to the next OK entry, or to
/// the last entry if none follows. With no usable entries the component is
/// assumed up; when every entry shares one timestamp the share of OK
/// entries is used instead. Entries with unparseable timestamps are skipped.
pub fn uptime_percentage(logs: &[StatusLog]) -> u8 {
    let mut timed: Vec<(DateTime<Utc>, bool)> = logs
        .iter()
        .filter_map(|log| log.parsed_timestamp().map(|ts| (ts, log.is_up())))
        .collect();
    if timed.is_empty() {
        return 100;
    }
    timed.sort_by_key(|(ts, _)| *ts);

    let first = timed[0].0;
    let last = timed[timed.len() - 1].0;
    let span_ms = (last - first).num_milliseconds();

    if span_ms <= 0 {
        let up = timed.iter().filter(|(_, up)| *up).count();
        return percent(up as f64, timed.len() as f64);
    }

    let mut downtime_ms = 0i64;
    let mut down_since: Option<DateTime<Utc>> = None;
    for (ts, up) in &timed {
        match (up, down_since) {
            (false, None) => down_since = Some(*ts),
            (true, Some(start)) => {
                downtime_ms += (*ts - start).num_milliseconds();
                down_since = None;
            }
            _ => {}
        }
    }
    if let Some(start) = down_since {
        downtime_ms += (last - start).num_milliseconds();
    }

    100 - percent(downtime_ms as f64, span_ms as f64)
}

fn percent(part: f64, whole: f64) -> u8 {
    ((part / whole) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Entries reporting anything other than OK.
pub fn downtime_logs(logs: &[StatusLog]) -> Vec<StatusLog> {
    logs.iter().filter(|log| !log.is_up()).cloned().collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentHealth {
    pub component: String,
    pub uptime_percent: u8,
    pub downtime_logs: Vec<StatusLog>,
}

impl ComponentHealth {
    pub fn from_logs(component: &str, logs: &[StatusLog]) -> Self {
        let own: Vec<StatusLog> = logs
            .iter()
            .filter(|log| log.component == component)
            .cloned()
            .collect();
        Self {
            component: component.to_string(),
            uptime_percent: uptime_percentage(&own),
            downtime_logs: downtime_logs(&own),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub server: ComponentHealth,
    pub database: ComponentHealth,
}

impl StatusReport {
    pub fn from_logs(logs: &[StatusLog]) -> Self {
        Self {
            server: ComponentHealth::from_logs(SERVER_COMPONENT, logs),
            database: ComponentHealth::from_logs(DATABASE_COMPONENT, logs),
        }
    }
}
