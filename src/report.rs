//! Status report payload combining analytics with recent activity

use crate::analytics::{self, AnalyticsSummary};
use crate::monitor::Monitor;
use crate::telemetry::{current_timestamp, PageVisit, RequestLog, ServiceStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: String,
    #[serde(with = "crate::telemetry::iso8601")]
    pub timestamp: DateTime<Utc>,
    pub analytics: AnalyticsSummary,
    pub services: Vec<ServiceStatus>,
    pub recent_requests: Vec<RequestLog>,
    pub recent_visits: Vec<PageVisit>,
}

impl StatusReport {
    /// Build a report holding the last `recent` entries of each log, oldest
    /// first. Analytics and listings come from the same read.
    pub async fn collect(monitor: &Monitor, recent: usize) -> Self {
        let doc = monitor.snapshot().await;
        let now = current_timestamp();

        Self {
            status: "ok".to_string(),
            timestamp: now,
            analytics: analytics::compute(&doc, now),
            services: doc.services,
            recent_requests: most_recent(doc.requests, recent),
            recent_visits: most_recent(doc.page_visits, recent),
        }
    }
}

/// The trailing `count` entries of `entries`, order preserved
pub fn most_recent<T>(mut entries: Vec<T>, count: usize) -> Vec<T> {
    let start = entries.len().saturating_sub(count);
    entries.split_off(start)
}
