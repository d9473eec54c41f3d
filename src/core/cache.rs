//! Read-side cache of serialized aggregates
//!
//! Every cacheable aggregate has one [`CacheKey`] and one time-to-live. Values
//! are stored as JSON strings. The cache is strictly best-effort: a backend
//! failure on read falls back to recomputation, and a failure on write or
//! invalidation is logged and ignored.
//!
//! Any mutation invalidates the whole key set returned by
//! [`ReadCache::invalidation_set`], including analysis keys for a window of
//! years around the current one. A reader that misses, recomputes, and writes
//! back concurrently with an invalidating write may leave a stale value in
//! place; it is bounded by the key's TTL.

use crate::grid::KeyValueCache;
use crate::types::{CacheTtls, LedgerError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Cached aggregate identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Project summaries
    Projects,
    /// Order list with paid totals
    Orders,
    /// Estimates that are still open
    ActiveProjects,
    Deposits,
    Payments,
    /// Counterparty directory
    Masters,
    /// Product catalog
    Products,
    /// Monthly analysis for one year
    Analysis(i32),
}

impl CacheKey {
    pub fn as_key(&self) -> String {
        match self {
            CacheKey::Projects => "projects_data".to_string(),
            CacheKey::Orders => "orders_data".to_string(),
            CacheKey::ActiveProjects => "active_projects_data".to_string(),
            CacheKey::Deposits => "deposits_data".to_string(),
            CacheKey::Payments => "payments_data".to_string(),
            CacheKey::Masters => "masters_data".to_string(),
            CacheKey::Products => "products_data".to_string(),
            CacheKey::Analysis(year) => format!("analysis_{}", year),
        }
    }

    pub fn ttl(&self, ttls: &CacheTtls) -> Duration {
        let secs = match self {
            CacheKey::Masters | CacheKey::Products => ttls.long_secs,
            CacheKey::Projects | CacheKey::ActiveProjects | CacheKey::Analysis(_) => {
                ttls.short_secs
            }
            CacheKey::Orders | CacheKey::Deposits | CacheKey::Payments => ttls.orders_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Best-effort cache in front of the aggregator
#[derive(Clone)]
pub struct ReadCache {
    backend: Arc<dyn KeyValueCache>,
    ttls: CacheTtls,
    years_back: i32,
    years_ahead: i32,
}

impl ReadCache {
    pub fn new(
        backend: Arc<dyn KeyValueCache>,
        ttls: CacheTtls,
        years_back: i32,
        years_ahead: i32,
    ) -> Self {
        Self {
            backend,
            ttls,
            years_back,
            years_ahead,
        }
    }

    /// Serve `key` from the cache, or compute, store and return it
    ///
    /// # Arguments
    ///
    /// * `key` - Aggregate to serve
    /// * `compute` - Recomputes the aggregate on a miss
    ///
    /// # Returns
    ///
    /// The cached or freshly computed value. Only errors from `compute`
    /// propagate; cache and (de)serialization failures degrade to a miss.
    pub fn get_or_compute<T, F>(&self, key: CacheKey, compute: F) -> Result<T, LedgerError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, LedgerError>,
    {
        let name = key.as_key();
        match self.backend.get(&name) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    log::debug!("cache hit: {}", name);
                    return Ok(value);
                }
                Err(e) => log::warn!("discarding undecodable cache entry {}: {}", name, e),
            },
            Ok(None) => log::debug!("cache miss: {}", name),
            Err(e) => log::warn!("cache read failed for {}: {}", name, e),
        }

        let value = compute()?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.backend.put(&name, &raw, key.ttl(&self.ttls)) {
                    log::warn!("cache write failed for {}: {}", name, e);
                }
            }
            Err(e) => log::warn!("could not serialize {} for caching: {}", name, e),
        }
        Ok(value)
    }

    /// Remove the given keys, ignoring backend failures
    pub fn invalidate(&self, keys: &[CacheKey]) {
        for key in keys {
            let name = key.as_key();
            if let Err(e) = self.backend.remove(&name) {
                log::warn!("cache invalidation failed for {}: {}", name, e);
            }
        }
    }

    /// Every key a mutation must drop, given the current year
    pub fn invalidation_set(&self, current_year: i32) -> Vec<CacheKey> {
        let mut keys = vec![
            CacheKey::Projects,
            CacheKey::Orders,
            CacheKey::ActiveProjects,
            CacheKey::Deposits,
            CacheKey::Payments,
            CacheKey::Masters,
            CacheKey::Products,
        ];
        keys.extend(
            (current_year - self.years_back..=current_year + self.years_ahead)
                .map(CacheKey::Analysis),
        );
        keys
    }

    /// Drop every key a mutation can affect
    pub fn invalidate_all(&self, current_year: i32) {
        self.invalidate(&self.invalidation_set(current_year));
    }
}
