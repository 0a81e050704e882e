//! Configuration management for the monitoring store

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Data directory used when `MONITORING_ENV=production`
pub const PRODUCTION_DATA_DIR: &str = "/tmp/monitoring";

/// Data directory used everywhere else, relative to the working directory.
pub const DEVELOPMENT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the monitoring document
    pub data_dir: PathBuf,

    /// File name of the monitoring document inside `data_dir`
    pub file_name: String,

    /// Maximum number of page visits retained
    pub max_page_visits: usize,

    /// Maximum number of request logs retained
    pub max_requests: usize,

    /// User agents longer than this many characters are truncated
    pub max_user_agent_len: usize,

    /// Number of most recent entries returned per log in a status report
    pub recent_window: usize,

    /// HTTP timeout for service health probes
    pub probe_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEVELOPMENT_DATA_DIR),
            file_name: "monitoring.json".to_string(),
            max_page_visits: 10_000,
            max_requests: 10_000,
            max_user_agent_len: 200,
            recent_window: 50,
            probe_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source. Values that
    /// fail to parse leave the default in place.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(deployment) = lookup("MONITORING_ENV") {
            if deployment.eq_ignore_ascii_case("production") {
                config.data_dir = PathBuf::from(PRODUCTION_DATA_DIR);
            }
        }

        if let Some(data_dir) = lookup("MONITORING_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Some(file_name) = lookup("MONITORING_FILE") {
            config.file_name = file_name;
        }

        if let Some(Ok(limit)) = lookup("MAX_PAGE_VISITS").map(|v| v.parse()) {
            config.max_page_visits = limit;
        }

        if let Some(Ok(limit)) = lookup("MAX_REQUESTS").map(|v| v.parse()) {
            config.max_requests = limit;
        }

        if let Some(Ok(len)) = lookup("MAX_USER_AGENT_LEN").map(|v| v.parse()) {
            config.max_user_agent_len = len;
        }

        if let Some(Ok(window)) = lookup("RECENT_WINDOW").map(|v| v.parse()) {
            config.recent_window = window;
        }

        if let Some(Ok(seconds)) = lookup("PROBE_TIMEOUT_SECONDS").map(|v| v.parse::<u64>()) {
            config.probe_timeout = Duration::from_secs(seconds);
        }

        config
    }

    /// Full path of the backing file
    pub fn document_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir cannot be empty".to_string());
        }

        if self.file_name.is_empty() {
            return Err("file_name cannot be empty".to_string());
        }

        if self.max_page_visits == 0 {
            return Err("max_page_visits must be greater than 0".to_string());
        }

        if self.max_requests == 0 {
            return Err("max_requests must be greater than 0".to_string());
        }

        if self.probe_timeout.is_zero() {
            return Err("probe_timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.document_path(), PathBuf::from("data/monitoring.json"));
        assert_eq!(config.max_page_visits, 10_000);
        assert_eq!(config.max_requests, 10_000);
        assert_eq!(config.max_user_agent_len, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_uses_tmp_dir() {
        let config = Config::from_lookup(lookup_from(&[("MONITORING_ENV", "production")]));
        assert_eq!(config.data_dir, PathBuf::from(PRODUCTION_DATA_DIR));
    }

    #[test]
    fn test_explicit_dir_wins_over_environment() {
        let config = Config::from_lookup(lookup_from(&[
            ("MONITORING_ENV", "production"),
            ("MONITORING_DATA_DIR", "/var/lib/monitoring"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/monitoring"));
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("MAX_REQUESTS", "lots"),
            ("RECENT_WINDOW", "25"),
        ]));
        assert_eq!(config.max_requests, 10_000);
        assert_eq!(config.recent_window, 25);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = Config {
            max_page_visits: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
