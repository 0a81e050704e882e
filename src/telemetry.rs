//! Telemetry event types and the persisted monitoring document

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A client reporting that it rendered a page
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageVisit {
    pub page: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub ip: String,
}

/// One completed API invocation and its outcome
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub endpoint: String,
    pub method: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    /// Wall-clock duration in milliseconds
    #[serde(deserialize_with = "milliseconds")]
    pub duration: f64,
    pub ip: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Up,
    Down,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Up => write!(f, "up"),
            ServiceState::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for ServiceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(ServiceState::Up),
            "down" => Ok(ServiceState::Down),
            other => Err(format!("unknown service state '{}'", other)),
        }
    }
}

/// Latest known health of one named dependency
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub status: ServiceState,
    #[serde(with = "iso8601")]
    pub last_checked: DateTime<Utc>,
    /// Milliseconds; 0 when the call failed or was not measured
    #[serde(deserialize_with = "milliseconds")]
    pub response_time: f64,
}

/// The single persisted aggregate holding every log and status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringDocument {
    pub page_visits: Vec<PageVisit>,
    pub requests: Vec<RequestLog>,
    pub services: Vec<ServiceStatus>,
    #[serde(with = "iso8601")]
    pub last_updated: DateTime<Utc>,
}

impl MonitoringDocument {
    /// Empty document stamped with the current time
    pub fn empty() -> Self {
        Self {
            page_visits: Vec::new(),
            requests: Vec::new(),
            services: Vec::new(),
            last_updated: current_timestamp(),
        }
    }

    /// Insert or overwrite the status entry for `status.name`. An existing
    /// entry keeps its position.
    pub fn upsert_service(&mut self, status: ServiceStatus) {
        match self.services.iter_mut().find(|s| s.name == status.name) {
            Some(existing) => *existing = status,
            None => self.services.push(status),
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Drop the oldest entries so neither log exceeds its limit
    pub fn trim(&mut self, max_page_visits: usize, max_requests: usize) {
        trim_front(&mut self.page_visits, max_page_visits);
        trim_front(&mut self.requests, max_requests);
    }

    /// Advance `last_updated` to `now`, never moving it backwards
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }
}

fn trim_front<T>(entries: &mut Vec<T>, limit: usize) {
    if entries.len() > limit {
        let excess = entries.len() - limit;
        entries.drain(..excess);
    }
}

impl PageVisit {
    pub fn new(page: String, user_agent: &str, ip: String, max_user_agent_len: usize) -> Self {
        Self {
            page,
            timestamp: current_timestamp(),
            user_agent: truncate_chars(user_agent, max_user_agent_len),
            ip,
        }
    }
}

impl RequestLog {
    pub fn new(endpoint: String, method: String, status_code: u16, duration: f64, ip: String) -> Self {
        Self {
            endpoint,
            method,
            timestamp: current_timestamp(),
            status_code,
            duration,
            ip,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

impl ServiceStatus {
    pub fn new(name: String, status: ServiceState, response_time: f64) -> Self {
        Self {
            name,
            status,
            last_checked: current_timestamp(),
            response_time,
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == ServiceState::Up
    }
}

/// Keep at most `max_chars` characters, never splitting a code point
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => value[..byte_index].to_string(),
        None => value.to_string(),
    }
}

/// Resolve the caller address from proxy headers: first `X-Forwarded-For`
/// hop, then `X-Real-IP`, then `"unknown"`.
pub fn client_ip(forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .or_else(|| real_ip.map(str::trim).filter(|ip| !ip.is_empty()))
        .unwrap_or("unknown")
        .to_string()
}

/// Current UTC time at the millisecond precision the document persists
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Millisecond measurements. `null` (how JSON writers emit NaN) reads as 0.
fn milliseconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// ISO-8601 timestamps, written with millisecond precision and a `Z` suffix
pub(crate) mod iso8601 {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Timestamps without an offset are taken as UTC
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(naive.and_utc());
            }
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}
