//! HTTP health probes for dependent services

use crate::errors::{MonitorError, Result};
use crate::monitor::Monitor;
use crate::telemetry::{ServiceState, ServiceStatus};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Issues a GET against a service's health URL and turns the outcome into a
/// `ServiceStatus`
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    client: Client,
}

impl ServiceProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("monitoring_store/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MonitorError::Http)?;

        Ok(Self { client })
    }

    /// Check a single service. A 2xx response is `up` with the elapsed
    /// milliseconds; anything else is `down` with a response time of 0.
    pub async fn check(&self, name: &str, url: &str) -> ServiceStatus {
        let start_time = Instant::now();

        let (status, response_time) = match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let elapsed = start_time.elapsed().as_secs_f64() * 1000.0;
                debug!("Service {} is up ({:.2}ms)", name, elapsed);
                (ServiceState::Up, elapsed)
            }
            Ok(response) => {
                warn!("Service {} returned non-success status {}", name, response.status());
                (ServiceState::Down, 0.0)
            }
            Err(e) => {
                warn!("Failed to connect to service {}: {}", name, e);
                (ServiceState::Down, 0.0)
            }
        };

        ServiceStatus::new(name.to_string(), status, response_time)
    }

    /// Check a service and upsert the result into the monitor
    pub async fn check_and_record(&self, monitor: &Monitor, name: &str, url: &str) -> ServiceStatus {
        let result = self.check(name, url).await;
        monitor
            .update_service_status(&result.name, result.status, result.response_time)
            .await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Limits;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_healthy_service_is_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let probe = ServiceProbe::new(Duration::from_secs(5)).unwrap();
        let status = probe.check("api", &format!("{}/health", server.uri())).await;

        assert_eq!(status.status, ServiceState::Up);
        assert!(status.response_time >= 0.0);
    }

    #[tokio::test]
    async fn test_error_status_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = ServiceProbe::new(Duration::from_secs(5)).unwrap();
        let status = probe.check("api", &server.uri()).await;

        assert_eq!(status.status, ServiceState::Down);
        assert_eq!(status.response_time, 0.0);
    }

    #[tokio::test]
    async fn test_timeout_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let probe = ServiceProbe::new(Duration::from_millis(100)).unwrap();
        let status = probe.check("slow", &server.uri()).await;

        assert_eq!(status.status, ServiceState::Down);
    }

    #[tokio::test]
    async fn test_check_and_record_upserts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let monitor = Monitor::new(Arc::new(MemoryStore::new()), Limits::default());
        let probe = ServiceProbe::new(Duration::from_secs(5)).unwrap();

        probe.check_and_record(&monitor, "api", &server.uri()).await;
        probe.check_and_record(&monitor, "api", &server.uri()).await;

        let doc = monitor.snapshot().await;
        assert_eq!(doc.services.len(), 1);
        assert!(doc.services[0].is_up());
    }
}
