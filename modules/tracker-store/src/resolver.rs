//! Dimension name resolution.
//!
//! A resolver turns a status/service/source name into its row. `Ok(None)`
//! means the name is unknown to the store; callers decide whether to create
//! it. Store failures are errors and are never cached.
//!
//! A caller that creates a row after a miss hands it back through
//! [`DimensionResolver::remember`], so its own writes are visible at once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracker_common::{DimensionKind, DimensionRow, ResolverKind, Result};

use crate::cache::TtlCache;
use crate::store::DimensionStore;

#[async_trait]
pub trait DimensionResolver: Send + Sync {
    async fn resolve(&self, kind: DimensionKind, name: &str) -> Result<Option<DimensionRow>>;

    async fn status(&self, name: &str) -> Result<Option<DimensionRow>> {
        self.resolve(DimensionKind::Status, name).await
    }

    async fn service(&self, name: &str) -> Result<Option<DimensionRow>> {
        self.resolve(DimensionKind::Service, name).await
    }

    async fn source(&self, name: &str) -> Result<Option<DimensionRow>> {
        self.resolve(DimensionKind::Source, name).await
    }

    /// Record a row this process just created. No-op for uncached resolvers.
    fn remember(&self, _kind: DimensionKind, _row: &DimensionRow) {}

    /// Live entry counts per dimension, or `None` when nothing is cached.
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Live cache entries per dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub statuses: usize,
    pub services: usize,
    pub sources: usize,
}

impl CacheStats {
    pub fn get(&self, kind: DimensionKind) -> usize {
        match kind {
            DimensionKind::Status => self.statuses,
            DimensionKind::Service => self.services,
            DimensionKind::Source => self.sources,
        }
    }
}

/// Build the resolver selected by configuration.
pub fn build_resolver(
    kind: ResolverKind,
    store: Arc<dyn DimensionStore>,
) -> Arc<dyn DimensionResolver> {
    let direct: Arc<dyn DimensionResolver> = Arc::new(DirectLookup::new(store));
    match kind {
        ResolverKind::Direct => direct,
        ResolverKind::Cached => Arc::new(CachedLookup::new(direct)),
    }
}

// ---------------------------------------------------------------------------
// DirectLookup
// ---------------------------------------------------------------------------

/// Queries the store on every call.
pub struct DirectLookup {
    store: Arc<dyn DimensionStore>,
}

impl DirectLookup {
    pub fn new(store: Arc<dyn DimensionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DimensionResolver for DirectLookup {
    async fn resolve(&self, kind: DimensionKind, name: &str) -> Result<Option<DimensionRow>> {
        self.store.find_by_name(kind, name).await
    }
}

// ---------------------------------------------------------------------------
// CachedLookup
// ---------------------------------------------------------------------------

/// Wraps another resolver with one TTL cache per dimension.
///
/// Misses are cached too. A row created by another process after a miss stays
/// invisible here until that entry expires; rows passed to `remember` replace
/// the cached miss immediately.
pub struct CachedLookup {
    inner: Arc<dyn DimensionResolver>,
    statuses: TtlCache<String, Option<DimensionRow>>,
    services: TtlCache<String, Option<DimensionRow>>,
    sources: TtlCache<String, Option<DimensionRow>>,
}

impl CachedLookup {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

    pub fn new(inner: Arc<dyn DimensionResolver>) -> Self {
        Self::with_ttl(inner, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(inner: Arc<dyn DimensionResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            statuses: TtlCache::new(ttl),
            services: TtlCache::new(ttl),
            sources: TtlCache::new(ttl),
        }
    }

    /// Live cache entries for one dimension, misses included.
    pub fn cached_entries(&self, kind: DimensionKind) -> usize {
        self.cache(kind).len()
    }

    fn cache(&self, kind: DimensionKind) -> &TtlCache<String, Option<DimensionRow>> {
        match kind {
            DimensionKind::Status => &self.statuses,
            DimensionKind::Service => &self.services,
            DimensionKind::Source => &self.sources,
        }
    }
}

#[async_trait]
impl DimensionResolver for CachedLookup {
    async fn resolve(&self, kind: DimensionKind, name: &str) -> Result<Option<DimensionRow>> {
        let cache = self.cache(kind);

        if let Some(cached) = cache.get(name) {
            debug!(kind = %kind, name, found = cached.is_some(), "Dimension cache hit");
            return Ok(cached);
        }

        let resolved = self.inner.resolve(kind, name).await?;
        debug!(kind = %kind, name, found = resolved.is_some(), "Dimension cache miss");
        cache.insert(name.to_string(), resolved.clone());

        Ok(resolved)
    }

    fn remember(&self, kind: DimensionKind, row: &DimensionRow) {
        self.cache(kind).insert(row.name.clone(), Some(row.clone()));
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        let purged: usize = DimensionKind::ALL
            .iter()
            .map(|kind| self.cache(*kind).purge_expired())
            .sum();
        if purged > 0 {
            debug!(purged, "Dropped expired dimension cache entries");
        }

        Some(CacheStats {
            statuses: self.cached_entries(DimensionKind::Status),
            services: self.cached_entries(DimensionKind::Service),
            sources: self.cached_entries(DimensionKind::Source),
        })
    }
}
