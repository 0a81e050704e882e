//! Persistence backends for the monitoring document

use crate::errors::{MonitorError, Result};
use crate::telemetry::MonitoringDocument;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Backend holding the single monitoring document
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the current document. An absent document is not an error and
    /// yields an empty one; unreadable or malformed contents are.
    async fn read(&self) -> Result<MonitoringDocument>;

    /// Replace the stored document with `doc`
    async fn write(&self, doc: &MonitoringDocument) -> Result<()>;

    /// Human-readable location used in log lines
    fn describe(&self) -> String;
}

/// Read the document, falling back to an empty one on any failure
pub async fn load(store: &dyn DocumentStore) -> MonitoringDocument {
    match store.read().await {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Error loading monitoring data from {}: {}", store.describe(), e);
            MonitoringDocument::empty()
        }
    }
}

/// Write the document, logging and discarding any failure
pub async fn persist(store: &dyn DocumentStore, doc: &MonitoringDocument) {
    if let Err(e) = store.write(doc).await {
        error!("Error saving monitoring data to {}: {}", store.describe(), e);
    }
}

/// JSON file backend
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        self.path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    async fn ensure_parent_dir(&self) -> Result<()> {
        fs::create_dir_all(self.parent_dir()).await?;
        Ok(())
    }
}

/// Write `content` to a uniquely named sibling of `path`, flush it to disk
/// and rename it over `path`. Concurrent writers never share a temp file.
fn replace_file(dir: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn read(&self) -> Result<MonitoringDocument> {
        self.ensure_parent_dir().await?;

        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No monitoring document at {}, starting empty", self.path.display());
                return Ok(MonitoringDocument::empty());
            }
            Err(e) => return Err(e.into()),
        };

        let doc: MonitoringDocument = serde_json::from_str(&raw)?;
        debug!(
            "Loaded monitoring document: {} visits, {} requests, {} services",
            doc.page_visits.len(),
            doc.requests.len(),
            doc.services.len()
        );
        Ok(doc)
    }

    async fn write(&self, doc: &MonitoringDocument) -> Result<()> {
        self.ensure_parent_dir().await?;

        let content = serde_json::to_vec_pretty(doc)?;
        let size = content.len();
        let dir = self.parent_dir();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || replace_file(&dir, &path, &content))
            .await
            .map_err(|e| MonitorError::Other(format!("write task failed: {}", e)))??;

        debug!("Saved monitoring document ({} bytes) to {}", size, self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process backend for ephemeral deployments and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RwLock<Option<MonitoringDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: MonitoringDocument) -> Self {
        Self {
            document: RwLock::new(Some(doc)),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self) -> Result<MonitoringDocument> {
        let document = self.document.read().await;
        Ok(document.clone().unwrap_or_else(MonitoringDocument::empty))
    }

    async fn write(&self, doc: &MonitoringDocument) -> Result<()> {
        *self.document.write().await = Some(doc.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{PageVisit, ServiceState, ServiceStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_empty_without_creating_it() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("nested").join("monitoring.json"));

        let doc = store.read().await.unwrap();
        assert!(doc.page_visits.is_empty());
        assert!(doc.requests.is_empty());
        assert!(doc.services.is_empty());

        assert!(tmp.path().join("nested").is_dir());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error_but_load_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("monitoring.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = FileStore::new(&path);

        assert!(matches!(store.read().await, Err(MonitorError::Json(_))));

        let doc = load(&store).await;
        assert!(doc.page_visits.is_empty());
        assert!(doc.services.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read_preserves_content() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("monitoring.json"));

        let mut doc = MonitoringDocument::empty();
        doc.page_visits.push(PageVisit::new("/timeline".to_string(), "ua", "1.1.1.1".to_string(), 200));
        doc.upsert_service(ServiceStatus::new("OpenAI API".to_string(), ServiceState::Up, 120.0));

        store.write(&doc).await.unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);

        let reread = store.read().await.unwrap();
        assert_eq!(reread, doc);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"pageVisits\""));
        assert!(raw.contains("\n  \"requests\""));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        // The target is a directory, so the rename cannot replace it
        let path = tmp.path().join("monitoring.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();
        let store = FileStore::new(&path);

        assert!(store.write(&MonitoringDocument::empty()).await.is_err());

        // The logging wrapper swallows it
        persist(&store, &MonitoringDocument::empty()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_one_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("monitoring.json");

        let mut doc = MonitoringDocument::empty();
        for i in 0..3_000 {
            doc.page_visits.push(PageVisit::new(format!("/{}", i), "ua", "ip".to_string(), 200));
        }
        let doc = std::sync::Arc::new(doc);

        let writers = (0..2).map(|_| {
            let store = FileStore::new(&path);
            let doc = std::sync::Arc::clone(&doc);
            tokio::spawn(async move {
                let mut failures = 0;
                for _ in 0..20 {
                    if store.write(&doc).await.is_err() {
                        failures += 1;
                    }
                }
                failures
            })
        });

        for failures in futures::future::join_all(writers).await {
            assert_eq!(failures.unwrap(), 0);
        }

        let reread = FileStore::new(&path).read().await.unwrap();
        assert_eq!(reread.page_visits.len(), 3_000);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.read().await.unwrap().requests.is_empty());

        let mut doc = MonitoringDocument::empty();
        doc.upsert_service(ServiceStatus::new("db".to_string(), ServiceState::Down, 0.0));
        store.write(&doc).await.unwrap();

        assert_eq!(store.read().await.unwrap().services.len(), 1);
    }
}
