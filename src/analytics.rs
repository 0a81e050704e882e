//! Read-time rollups over the monitoring document

use crate::telemetry::MonitoringDocument;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Length of the rolling window behind `visits24h` and `requests24h`
pub const ROLLING_WINDOW_HOURS: i64 = 24;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_page_visits: usize,
    pub total_requests: usize,
    pub page_stats: HashMap<String, usize>,
    pub method_stats: HashMap<String, usize>,
    pub endpoint_stats: HashMap<String, usize>,
    /// Mean request duration in milliseconds, rounded to 2 decimals
    pub avg_response_time: f64,
    #[serde(rename = "visits24h")]
    pub visits_24h: usize,
    #[serde(rename = "requests24h")]
    pub requests_24h: usize,
    /// Number of services currently up
    pub uptime: usize,
    pub total_services: usize,
}

impl AnalyticsSummary {
    /// Pages ranked by visit count, most visited first. Ties are ordered by
    /// page path so the ranking is stable.
    pub fn top_pages(&self, limit: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self
            .page_stats
            .iter()
            .map(|(page, count)| (page.clone(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }
}

/// Compute the summary for `doc` as seen at `now`
pub fn compute(doc: &MonitoringDocument, now: DateTime<Utc>) -> AnalyticsSummary {
    let cutoff = now - Duration::hours(ROLLING_WINDOW_HOURS);

    let mut page_stats = HashMap::new();
    for visit in &doc.page_visits {
        *page_stats.entry(visit.page.clone()).or_insert(0) += 1;
    }

    let mut method_stats = HashMap::new();
    let mut endpoint_stats = HashMap::new();
    let mut total_duration = 0.0;
    for request in &doc.requests {
        *method_stats.entry(request.method.clone()).or_insert(0) += 1;
        *endpoint_stats.entry(request.endpoint.clone()).or_insert(0) += 1;
        total_duration += request.duration;
    }

    let avg_response_time = if doc.requests.is_empty() {
        0.0
    } else {
        round_2(total_duration / doc.requests.len() as f64)
    };

    AnalyticsSummary {
        total_page_visits: doc.page_visits.len(),
        total_requests: doc.requests.len(),
        page_stats,
        method_stats,
        endpoint_stats,
        avg_response_time,
        visits_24h: doc.page_visits.iter().filter(|v| v.timestamp > cutoff).count(),
        requests_24h: doc.requests.iter().filter(|r| r.timestamp > cutoff).count(),
        uptime: doc.services.iter().filter(|s| s.is_up()).count(),
        total_services: doc.services.len(),
    }
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
