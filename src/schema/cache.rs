//! Schema cache with TTL, single-flight reload and stale fallback
//!
//! Readers take the current snapshot under a short read lock and never wait
//! on a fetch while it is fresh. Refreshes are funnelled through one shared
//! load future: the first caller to miss creates it, later callers clone
//! and await the same future, so the provider sees at most one fetch at a
//! time. A failed refresh falls back to the previous snapshot.

use crate::config::SchemaCacheConfig;
use crate::schema::{SchemaError, SchemaProvider, SchemaResult, SchemaSnapshot};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type LoadResult = Result<Arc<SchemaSnapshot>, SchemaError>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Default)]
struct CacheSlot {
    snapshot: Option<Arc<SchemaSnapshot>>,
    last_load_attempt: Option<Instant>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
}

struct Inner {
    provider: Arc<dyn SchemaProvider>,
    ttl: Duration,
    load_attempt_interval: Duration,
    slot: RwLock<CacheSlot>,
    in_flight: Mutex<Option<LoadFuture>>,
    counters: Counters,
}

impl Inner {
    fn read_slot(&self) -> RwLockReadGuard<'_, CacheSlot> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, CacheSlot> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh_snapshot(&self) -> Option<Arc<SchemaSnapshot>> {
        self.read_slot()
            .snapshot
            .as_ref()
            .filter(|s| !s.is_expired())
            .cloned()
    }

    /// Body of the shared load future
    async fn load(self: Arc<Self>) -> LoadResult {
        info!("Loading database schema (lazy load)");
        self.write_slot().last_load_attempt = Some(Instant::now());
        self.counters.loads.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.provider.fetch_schema().await {
            Ok(info) => {
                let snapshot = Arc::new(SchemaSnapshot::new(info.render(), self.ttl));
                self.write_slot().snapshot = Some(Arc::clone(&snapshot));
                info!(
                    ttl_seconds = self.ttl.as_secs(),
                    schema_length = snapshot.text.len(),
                    "Schema loaded successfully"
                );
                Ok(snapshot)
            }
            Err(e) => {
                error!("Failed to load schema: {}", e);
                self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        };

        // Later misses start a new load
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
        outcome
    }
}

/// Cache freshness as seen by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    NoCache,
    Valid,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub state: CacheState,
    pub created_at: Option<DateTime<Utc>>,
    pub ttl_seconds: u64,
    pub seconds_until_expiry: Option<f64>,
    pub schema_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub stale_hits: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub seconds_since_last_load_attempt: Option<f64>,
}

/// Lazily loaded, time-bounded schema text shared by all pipeline runs.
///
/// Cloning is cheap and clones share the same cache.
#[derive(Clone)]
pub struct SchemaCacheManager {
    inner: Arc<Inner>,
}

impl SchemaCacheManager {
    pub fn new(provider: Arc<dyn SchemaProvider>, ttl: Duration, load_attempt_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                ttl,
                load_attempt_interval,
                slot: RwLock::new(CacheSlot::default()),
                in_flight: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    pub fn from_config(provider: Arc<dyn SchemaProvider>, config: &SchemaCacheConfig) -> Self {
        Self::new(provider, config.ttl(), config.load_attempt_interval())
    }

    /// Current schema text.
    ///
    /// Fails only when nothing has ever been fetched and the fetch fails.
    pub async fn get_schema(&self) -> SchemaResult<String> {
        let mut clear_attempt = None;
        {
            let slot = self.inner.read_slot();
            if let Some(snapshot) = slot.snapshot.as_ref().filter(|s| !s.is_expired()) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Using cached schema (expires in {:.1}s)",
                    snapshot.time_until_expiry()
                );
                return Ok(snapshot.text.clone());
            }

            if let Some(last) = slot.last_load_attempt {
                let since = last.elapsed();
                if since < self.inner.load_attempt_interval {
                    if let Some(snapshot) = slot.snapshot.as_ref() {
                        self.inner.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "Using expired cache due to rate limiting (last attempt {:.1}s ago)",
                            since.as_secs_f64()
                        );
                        return Ok(snapshot.text.clone());
                    }
                    clear_attempt = Some(last);
                }
            }
        }

        // Nothing to serve, so allow the retry
        if let Some(last) = clear_attempt {
            let mut slot = self.inner.write_slot();
            if slot.snapshot.is_none() && slot.last_load_attempt == Some(last) {
                slot.last_load_attempt = None;
            }
        }

        match self.join_or_start_load().await {
            Ok(snapshot) => Ok(snapshot.text.clone()),
            Err(e) => {
                let previous = self.inner.read_slot().snapshot.clone();
                match previous {
                    Some(snapshot) => {
                        self.inner.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
                        warn!("Using expired cache due to load failure");
                        Ok(snapshot.text.clone())
                    }
                    None => Err(SchemaError::Unavailable(e.to_string())),
                }
            }
        }
    }

    fn join_or_start_load(&self) -> LoadFuture {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(load) = in_flight.as_ref() {
            debug!("Joining in-flight schema load");
            return load.clone();
        }

        // Another caller may have refreshed between our miss and this lock
        if let Some(snapshot) = self.inner.fresh_snapshot() {
            return futures::future::ready(Ok(snapshot)).boxed().shared();
        }

        let load = Arc::clone(&self.inner).load().boxed().shared();
        *in_flight = Some(load.clone());
        load
    }

    /// Warm the cache; failures are logged, not returned
    pub async fn preload_schema(&self) {
        info!("Preloading database schema for better performance...");
        match self.get_schema().await {
            Ok(_) => info!("Schema preloaded successfully"),
            Err(e) => warn!("Failed to preload schema: {}", e),
        }
    }

    /// Fire-and-forget `preload_schema` on the runtime
    pub fn spawn_preload(&self) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move { cache.preload_schema().await })
    }

    /// Drop the current snapshot so the next read fetches
    pub fn invalidate(&self) {
        let mut slot = self.inner.write_slot();
        slot.snapshot = None;
        slot.last_load_attempt = None;
        info!("Schema cache invalidated");
    }

    pub fn status(&self) -> CacheStatus {
        let slot = self.inner.read_slot();
        match slot.snapshot.as_ref() {
            None => CacheStatus {
                state: CacheState::NoCache,
                created_at: None,
                ttl_seconds: self.inner.ttl.as_secs(),
                seconds_until_expiry: None,
                schema_length: None,
            },
            Some(snapshot) => CacheStatus {
                state: if snapshot.is_expired() { CacheState::Expired } else { CacheState::Valid },
                created_at: Some(snapshot.created_at),
                ttl_seconds: snapshot.ttl.as_secs(),
                seconds_until_expiry: Some(snapshot.time_until_expiry()),
                schema_length: Some(snapshot.text.len()),
            },
        }
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            stale_hits: counters.stale_hits.load(Ordering::Relaxed),
            loads: counters.loads.load(Ordering::Relaxed),
            load_failures: counters.load_failures.load(Ordering::Relaxed),
            seconds_since_last_load_attempt: self
                .inner
                .read_slot()
                .last_load_attempt
                .map(|t| t.elapsed().as_secs_f64()),
        }
    }
}
