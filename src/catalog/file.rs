//! In-memory and file-backed catalog stores

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::CatalogStore;
use crate::error::{MatcherError, MatcherResult};
use crate::types::Service;

/// Catalog held in memory; useful for tests and embedded deployments
#[derive(Default)]
pub struct InMemoryCatalogStore {
    services: RwLock<Vec<Service>>,
}

impl InMemoryCatalogStore {
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services: RwLock::new(services),
        }
    }

    /// Insert or replace a service by code
    pub async fn upsert(&self, service: Service) {
        let mut services = self.services.write().await;
        match services.iter_mut().find(|s| s.code == service.code) {
            Some(existing) => *existing = service,
            None => services.push(service),
        }
    }

    pub async fn remove(&self, code: &str) -> bool {
        let mut services = self.services.write().await;
        let before = services.len();
        services.retain(|s| s.code != code);
        services.len() != before
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn fetch_active_services(&self) -> MatcherResult<Vec<Service>> {
        Ok(self
            .services
            .read()
            .await
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Catalog file: either a bare list of services or `{ services: [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<Service>),
    Wrapped { services: Vec<Service> },
}

impl CatalogFile {
    fn into_services(self) -> Vec<Service> {
        match self {
            CatalogFile::List(services) => services,
            CatalogFile::Wrapped { services } => services,
        }
    }
}

/// Catalog read from a JSON or YAML file on every load
pub struct FileCatalogStore {
    path: PathBuf,
}

impl FileCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse catalog text, choosing the format from the file extension
    pub fn parse(path: &Path, content: &str) -> MatcherResult<Vec<Service>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let file: CatalogFile = match ext.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(content)?,
            Some("json") | None => serde_json::from_str(content)?,
            Some(other) => {
                return Err(MatcherError::Config(format!(
                    "Unsupported catalog file extension '{}'",
                    other
                )))
            }
        };
        Ok(file.into_services())
    }
}

#[async_trait]
impl CatalogStore for FileCatalogStore {
    async fn fetch_active_services(&self) -> MatcherResult<Vec<Service>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let services = Self::parse(&self.path, &content)?;
        Ok(services.into_iter().filter(|s| s.is_active).collect())
    }

    fn name(&self) -> &str {
        "file"
    }
}
