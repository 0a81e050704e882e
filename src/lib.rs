//! Monitoring & Analytics Store
//!
//! This library records page visits, API request outcomes and dependent-service
//! health into a single file-persisted document and derives rollup analytics
//! from it on every read.

pub mod analytics;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod probe;
pub mod report;
pub mod store;
pub mod telemetry;

pub use analytics::AnalyticsSummary;
pub use config::Config;
pub use errors::{MonitorError, Result};
pub use monitor::{Limits, Monitor};
pub use probe::ServiceProbe;
pub use report::StatusReport;
pub use store::{DocumentStore, FileStore, MemoryStore};
pub use telemetry::{client_ip, MonitoringDocument, PageVisit, RequestLog, ServiceState, ServiceStatus};
