//! Event recorders and the query facade over the monitoring document

use crate::analytics::{self, AnalyticsSummary};
use crate::config::Config;
use crate::errors::{MonitorError, Result};
use crate::store::{self, DocumentStore, FileStore};
use crate::telemetry::{
    current_timestamp, MonitoringDocument, PageVisit, RequestLog, ServiceState, ServiceStatus,
};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, instrument};

/// Retention and truncation limits applied on every write
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_page_visits: usize,
    pub max_requests: usize,
    pub max_user_agent_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_page_visits: config.max_page_visits,
            max_requests: config.max_requests,
            max_user_agent_len: config.max_user_agent_len,
        }
    }
}

/// Owner of the monitoring document.
///
/// Every mutation runs its load, mutate, trim, stamp and store steps while
/// holding `write_lock`, so concurrent writers sharing one `Monitor` never
/// lose each other's updates. Readers do not take the lock: the file backend
/// replaces the document by rename, so a read sees either the old or the new
/// document in full.
///
/// The public recorders never fail. Their `try_` counterparts return the
/// underlying error for callers that want to see it.
pub struct Monitor {
    store: Arc<dyn DocumentStore>,
    limits: Limits,
    write_lock: Mutex<()>,
}

impl Monitor {
    pub fn new(store: Arc<dyn DocumentStore>, limits: Limits) -> Self {
        Self {
            store,
            limits,
            write_lock: Mutex::new(()),
        }
    }

    /// Build a file-backed monitor from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate().map_err(MonitorError::Config)?;
        let store = FileStore::new(config.document_path());
        Ok(Self::new(Arc::new(store), Limits::from(config)))
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Record that a client rendered `page`
    pub async fn record_page_visit(&self, page: &str, user_agent: &str, ip: &str) {
        if let Err(e) = self.try_record_page_visit(page, user_agent, ip).await {
            error!("Failed to record page visit for {}: {}", page, e);
        }
    }

    #[instrument(skip(self, user_agent))]
    pub async fn try_record_page_visit(&self, page: &str, user_agent: &str, ip: &str) -> Result<()> {
        let visit = PageVisit::new(
            page.to_string(),
            user_agent,
            ip.to_string(),
            self.limits.max_user_agent_len,
        );
        self.mutate(|doc| doc.page_visits.push(visit)).await
    }

    /// Record one completed API call. `duration` is the caller-measured
    /// elapsed time in milliseconds.
    pub async fn record_request(
        &self,
        endpoint: &str,
        method: &str,
        status_code: u16,
        duration: f64,
        ip: &str,
    ) {
        if let Err(e) = self
            .try_record_request(endpoint, method, status_code, duration, ip)
            .await
        {
            error!("Failed to record request {} {}: {}", method, endpoint, e);
        }
    }

    #[instrument(skip(self))]
    pub async fn try_record_request(
        &self,
        endpoint: &str,
        method: &str,
        status_code: u16,
        duration: f64,
        ip: &str,
    ) -> Result<()> {
        ensure_finite("duration", duration)?;
        let log = RequestLog::new(
            endpoint.to_string(),
            method.to_string(),
            status_code,
            duration,
            ip.to_string(),
        );
        self.mutate(|doc| doc.requests.push(log)).await
    }

    /// Insert or overwrite the status of the service called `name`
    pub async fn update_service_status(&self, name: &str, status: ServiceState, response_time: f64) {
        if let Err(e) = self
            .try_update_service_status(name, status, response_time)
            .await
        {
            error!("Failed to update status of service {}: {}", name, e);
        }
    }

    #[instrument(skip(self))]
    pub async fn try_update_service_status(
        &self,
        name: &str,
        status: ServiceState,
        response_time: f64,
    ) -> Result<()> {
        ensure_finite("response time", response_time)?;
        let entry = ServiceStatus::new(name.to_string(), status, response_time);
        self.mutate(|doc| doc.upsert_service(entry)).await
    }

    /// Summary statistics over the current document
    pub async fn compute_analytics(&self) -> AnalyticsSummary {
        let doc = store::load(self.store.as_ref()).await;
        analytics::compute(&doc, current_timestamp())
    }

    /// The full current document. Callers slice the logs for display.
    pub async fn snapshot(&self) -> MonitoringDocument {
        store::load(self.store.as_ref()).await
    }

    /// Run a downstream call and record the dependency's health: `up` with
    /// the elapsed milliseconds on success, `down` with 0 on failure. The
    /// call's own result is returned unchanged.
    pub async fn track_dependency<F, T, E>(&self, name: &str, call: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        let started = Instant::now();
        let outcome = call.await;

        match &outcome {
            Ok(_) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                self.update_service_status(name, ServiceState::Up, elapsed).await;
            }
            Err(_) => {
                self.update_service_status(name, ServiceState::Down, 0.0).await;
            }
        }

        outcome
    }

    /// Run a request handler and record exactly one request log for it,
    /// using the status code the handler resolved to.
    pub async fn instrument_request<F, T>(&self, endpoint: &str, method: &str, ip: &str, handler: F) -> T
    where
        F: Future<Output = (u16, T)>,
    {
        let started = Instant::now();
        let (status_code, response) = handler.await;
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;

        self.record_request(endpoint, method, status_code, elapsed, ip).await;
        response
    }

    async fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut MonitoringDocument),
    {
        let _guard = self.write_lock.lock().await;

        let mut doc = store::load(self.store.as_ref()).await;
        apply(&mut doc);
        doc.trim(self.limits.max_page_visits, self.limits.max_requests);
        doc.stamp(current_timestamp());

        self.store.write(&doc).await?;
        debug!(
            "Monitoring document updated: {} visits, {} requests, {} services",
            doc.page_visits.len(),
            doc.requests.len(),
            doc.services.len()
        );
        Ok(())
    }
}

/// JSON has no encoding for NaN or infinity, so such a sample would be
/// persisted as `null`.
fn ensure_finite(field: &str, millis: f64) -> Result<()> {
    if millis.is_finite() {
        Ok(())
    } else {
        Err(MonitorError::Other(format!(
            "{} must be a finite number of milliseconds, got {}",
            field, millis
        )))
    }
}
