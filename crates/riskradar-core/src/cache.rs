//! Time-boxed cache in front of a [`SeriesResolver`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::routing::{AcquisitionError, FetchOutcome, SeriesResolver};
use crate::{CanonicalSymbol, DateRange};

/// Default freshness window for resolved series.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    outcome: FetchOutcome,
    expires_at: Instant,
}

type CacheKey = (CanonicalSymbol, DateRange);

/// Decorator caching successful outcomes by symbol and range.
///
/// Failures are never cached, so a later call retries the chain.
pub struct CachedResolver<R> {
    inner: R,
    ttl: Duration,
    entries: Arc<tokio::sync::RwLock<HashMap<CacheKey, CacheEntry>>>,
}

impl<R: SeriesResolver> CachedResolver<R> {
    pub fn new(inner: R) -> Self {
        Self::with_ttl(inner, DEFAULT_CACHE_TTL)
    }

    /// A zero TTL disables caching.
    pub fn with_ttl(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl == Duration::ZERO
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn cached_resolve(
        &self,
        canonical: &CanonicalSymbol,
        range: DateRange,
    ) -> Result<FetchOutcome, AcquisitionError> {
        if self.is_disabled() {
            return self.inner.resolve(canonical, range).await;
        }

        let key = (canonical.clone(), range);
        if let Some(entry) = self.entries.read().await.get(&key) {
            if Instant::now() <= entry.expires_at {
                debug!(symbol = %canonical, range = %range, "cache hit");
                let mut outcome = entry.outcome.clone();
                outcome.cache_hit = true;
                outcome.latency_ms = 0;
                return Ok(outcome);
            }
        }

        let outcome = self.inner.resolve(canonical, range).await?;
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            CacheEntry {
                outcome: outcome.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(outcome)
    }
}

impl<R: SeriesResolver> SeriesResolver for CachedResolver<R> {
    fn resolve<'a>(
        &'a self,
        canonical: &'a CanonicalSymbol,
        range: DateRange,
    ) -> Pin<Box<dyn Future<Output = Result<FetchOutcome, AcquisitionError>> + Send + 'a>> {
        Box::pin(self.cached_resolve(canonical, range))
    }
}
