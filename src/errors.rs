//! Error types for the monitoring store

use std::fmt;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug)]
pub enum MonitorError {
    /// IO operation on the backing file failed
    Io(std::io::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Health probe request failed
    Http(reqwest::Error),

    /// Configuration error
    Config(String),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Io(err) => write!(f, "IO error: {}", err),
            MonitorError::Json(err) => write!(f, "JSON error: {}", err),
            MonitorError::Http(err) => write!(f, "HTTP error: {}", err),
            MonitorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MonitorError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Io(err) => Some(err),
            MonitorError::Json(err) => Some(err),
            MonitorError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err)
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Json(err)
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Http(err)
    }
}
