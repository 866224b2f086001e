//! Catalog cache
//!
//! Keeps the last good snapshot of the active service catalog and shields the
//! rest of the engine from store latency and outages. Callers never see an
//! error: an unreachable store degrades to an empty catalog, which in turn
//! degrades matching to "no match".

mod file;
#[cfg(feature = "database")]
pub mod postgres;

pub use file::{FileCatalogStore, InMemoryCatalogStore};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MatcherConfig;
use crate::error::{MatcherError, MatcherResult};
use crate::types::Service;

/// Read-only source of catalog rows
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch all active services
    async fn fetch_active_services(&self) -> MatcherResult<Vec<Service>>;

    /// Store name for logging
    fn name(&self) -> &str;
}

struct Snapshot {
    services: Arc<Vec<Service>>,
    loaded_at: Instant,
}

/// TTL cache over a [`CatalogStore`]
pub struct CatalogCache {
    store: Arc<dyn CatalogStore>,
    ttl: Duration,
    retry_attempts: u32,
    retry_base_delay: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    /// Serializes reloads so concurrent callers share one fetch
    reload: Mutex<()>,
    /// Bumped each time a reload gives up after exhausting its retries
    failed_reloads: AtomicU64,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_config(store, &MatcherConfig::default())
    }

    pub fn with_config(store: Arc<dyn CatalogStore>, config: &MatcherConfig) -> Self {
        Self {
            store,
            ttl: config.catalog_ttl,
            retry_attempts: config.catalog_retry_attempts,
            retry_base_delay: config.catalog_retry_base_delay,
            snapshot: RwLock::new(None),
            reload: Mutex::new(()),
            failed_reloads: AtomicU64::new(0),
        }
    }

    /// Current active services.
    ///
    /// Serves the snapshot while it is within TTL. Once it has expired the
    /// store is reloaded with exponential backoff; if every attempt fails an
    /// empty catalog is returned.
    ///
    /// Callers that queued behind a reload which then gave up get the empty
    /// catalog at once instead of starting another backoff cycle.
    pub async fn get_active_services(&self) -> Arc<Vec<Service>> {
        if let Some(services) = self.fresh_snapshot().await {
            return services;
        }

        let seen_failures = self.failed_reloads.load(Ordering::Acquire);
        let _guard = self.reload.lock().await;

        // Someone else may have reloaded while we waited
        if let Some(services) = self.fresh_snapshot().await {
            return services;
        }
        if self.failed_reloads.load(Ordering::Acquire) != seen_failures {
            debug!(store = self.store.name(), "Reload failed while waiting, serving empty catalog");
            return Arc::new(Vec::new());
        }

        match self.load_recorded().await {
            Ok(services) => services,
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Catalog load exhausted retries, serving empty catalog");
                Arc::new(Vec::new())
            }
        }
    }

    /// Force a reload regardless of TTL. Returns the number of active services.
    pub async fn refresh(&self) -> MatcherResult<usize> {
        let _guard = self.reload.lock().await;
        let services = self.load_recorded().await?;
        Ok(services.len())
    }

    /// Drop the snapshot so the next read reloads
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    async fn fresh_snapshot(&self) -> Option<Arc<Vec<Service>>> {
        let guard = self.snapshot.read().await;
        guard
            .as_ref()
            .filter(|s| s.loaded_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.services))
    }

    /// Load while holding the reload lock, counting exhausted attempts
    async fn load_recorded(&self) -> MatcherResult<Arc<Vec<Service>>> {
        let result = self.load_with_retry().await;
        if result.is_err() {
            self.failed_reloads.fetch_add(1, Ordering::Release);
        }
        result
    }

    async fn load_with_retry(&self) -> MatcherResult<Arc<Vec<Service>>> {
        let mut delay = self.retry_base_delay;
        let mut last_error = None;

        for attempt in 0..=self.retry_attempts {
            if attempt > 0 {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying catalog load");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            match self.store.fetch_active_services().await {
                Ok(services) => {
                    let active: Vec<Service> =
                        services.into_iter().filter(|s| s.is_active).collect();
                    info!(
                        store = self.store.name(),
                        count = active.len(),
                        "Catalog snapshot loaded"
                    );
                    let services = Arc::new(active);
                    *self.snapshot.write().await = Some(Snapshot {
                        services: Arc::clone(&services),
                        loaded_at: Instant::now(),
                    });
                    return Ok(services);
                }
                Err(e) => {
                    warn!(store = self.store.name(), attempt, error = %e, "Catalog load failed");
                    last_error = Some(e);
                }
            }
        }

        Err(MatcherError::CatalogUnavailable(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicUsize;

    fn service(code: &str, active: bool) -> Service {
        Service {
            code: code.to_string(),
            name: code.to_string(),
            description: String::new(),
            price: Decimal::new(5000, 2),
            estimated_minutes: 60,
            keywords: vec![],
            negative_keywords: vec![],
            embedding: None,
            category: "general".to_string(),
            is_active: active,
        }
    }

    /// Fails for the first `failures` calls, then succeeds
    struct FlakyStore {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl CatalogStore for FlakyStore {
        async fn fetch_active_services(&self) -> MatcherResult<Vec<Service>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(MatcherError::CatalogUnavailable("down".into()))
            } else {
                Ok(vec![service("A", true), service("B", false)])
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_served_within_ttl() {
        let store = Arc::new(FlakyStore {
            calls: AtomicUsize::new(0),
            failures: 0,
        });
        let cache = CatalogCache::new(store.clone());

        let first = cache.get_active_services().await;
        assert_eq!(first.len(), 1, "inactive services are filtered");

        tokio::time::advance(Duration::from_secs(1800)).await;
        cache.get_active_services().await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1801)).await;
        cache.get_active_services().await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff_then_succeeds() {
        let store = Arc::new(FlakyStore {
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let cache = CatalogCache::new(store.clone());

        let start = Instant::now();
        let services = cache.get_active_services().await;
        assert_eq!(services.len(), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_empty() {
        let store = Arc::new(FlakyStore {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
        });
        let cache = CatalogCache::new(store.clone());

        let start = Instant::now();
        let services = cache.get_active_services().await;
        assert!(services.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s of backoff
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_callers_share_a_failed_reload() {
        let store = Arc::new(FlakyStore {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
        });
        let cache = Arc::new(CatalogCache::new(store.clone()));

        let start = Instant::now();
        let readers = (0..5).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_active_services().await })
        });
        for services in futures::future::join_all(readers).await {
            assert!(services.unwrap().is_empty());
        }

        // One backoff cycle in total, not one per caller
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() < Duration::from_secs(8));

        // A later caller starts a fresh attempt
        cache.get_active_services().await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_reports_error_on_exhaustion() {
        let store = Arc::new(FlakyStore {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
        });
        let cache = CatalogCache::new(store);
        assert!(cache.refresh().await.is_err());
    }
}
