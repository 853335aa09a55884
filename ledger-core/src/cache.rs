//! Read-through projection cache
//!
//! Caches the active-account and active-option lists that terminals pull.
//! The cache is never a source of truth: every failure is logged and
//! treated as a miss, and every write path invalidates the affected key.
//!
//! Read-through fills go through [`Invalidations`] so a list read from the
//! store before a commit is never written back after that commit's
//! invalidation.

use crate::config::{CacheBackend, CacheConfig};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Cache key names
pub mod keys {
    /// Active accounts projection
    pub const ACTIVE_ACCOUNTS: &str = "accounts";
    /// Active catalogue options projection
    pub const ACTIVE_OPTIONS: &str = "options";
}

/// Upper bound for a single Redis round-trip
const REDIS_OP_TIMEOUT: Duration = Duration::from_millis(250);

/// Serialized projection with its expiry
#[derive(Debug)]
pub struct CachedValue {
    json: String,
    expires_at: Instant,
}

/// Projection cache backend
pub enum ProjectionCache {
    /// Shared Redis instance
    Redis(ConnectionManager),
    /// In-process TTL map
    InMemory(DashMap<String, CachedValue>),
    /// Disabled or unreachable; every lookup misses
    Degraded,
}

impl fmt::Debug for ProjectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionCache::Redis(_) => f.write_str("ProjectionCache::Redis"),
            ProjectionCache::InMemory(map) => {
                write!(f, "ProjectionCache::InMemory({} keys)", map.len())
            }
            ProjectionCache::Degraded => f.write_str("ProjectionCache::Degraded"),
        }
    }
}

impl ProjectionCache {
    /// Build the configured backend
    ///
    /// An unreachable Redis does not fail startup: the cache comes up
    /// degraded and reads go straight to the store.
    pub async fn connect(config: &CacheConfig) -> Self {
        match config.backend {
            CacheBackend::Memory => ProjectionCache::in_memory(),
            CacheBackend::Disabled => ProjectionCache::Degraded,
            CacheBackend::Redis => {
                let client = match redis::Client::open(config.redis_url.as_str()) {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Invalid Redis URL {}: {}", config.redis_url, e);
                        return ProjectionCache::Degraded;
                    }
                };
                match tokio::time::timeout(Duration::from_secs(2), ConnectionManager::new(client))
                    .await
                {
                    Ok(Ok(manager)) => {
                        info!("Connected projection cache to {}", config.redis_url);
                        ProjectionCache::Redis(manager)
                    }
                    Ok(Err(e)) => {
                        warn!("Redis unavailable, running without cache: {}", e);
                        ProjectionCache::Degraded
                    }
                    Err(_) => {
                        warn!("Redis connect timed out, running without cache");
                        ProjectionCache::Degraded
                    }
                }
            }
        }
    }

    /// Empty in-process cache
    pub fn in_memory() -> Self {
        ProjectionCache::InMemory(DashMap::new())
    }

    /// Cache status for health output
    pub fn backend_name(&self) -> &'static str {
        match self {
            ProjectionCache::Redis(_) => "connected",
            ProjectionCache::InMemory(_) => "in_memory",
            ProjectionCache::Degraded => "degraded",
        }
    }

    /// Look up a cached projection
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = match self {
            ProjectionCache::Redis(manager) => {
                let mut conn = manager.clone();
                match tokio::time::timeout(REDIS_OP_TIMEOUT, conn.get::<_, Option<String>>(key))
                    .await
                {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        error!("Redis error getting {}: {}", key, e);
                        None
                    }
                    Err(_) => {
                        warn!("Redis get {} timed out", key);
                        None
                    }
                }
            }
            ProjectionCache::InMemory(map) => {
                let fresh = map
                    .get(key)
                    .filter(|cached| cached.expires_at > Instant::now())
                    .map(|cached| cached.json.clone());
                if fresh.is_none() {
                    map.remove(key);
                }
                fresh
            }
            ProjectionCache::Degraded => None,
        }?;

        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to deserialize cached {}: {}", key, e);
                None
            }
        }
    }

    /// Store a projection for `ttl`
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize {} for cache: {}", key, e);
                return;
            }
        };

        match self {
            ProjectionCache::Redis(manager) => {
                let mut conn = manager.clone();
                let op = conn.set_ex::<_, _, ()>(key, json, ttl.as_secs().max(1));
                match tokio::time::timeout(REDIS_OP_TIMEOUT, op).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Redis error setting {}: {}", key, e),
                    Err(_) => warn!("Redis set {} timed out", key),
                }
            }
            ProjectionCache::InMemory(map) => {
                map.insert(
                    key.to_string(),
                    CachedValue {
                        json,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            ProjectionCache::Degraded => {}
        }
    }

    /// Drop a projection so the next read rebuilds it
    pub async fn invalidate(&self, key: &str) {
        match self {
            ProjectionCache::Redis(manager) => {
                let mut conn = manager.clone();
                match tokio::time::timeout(REDIS_OP_TIMEOUT, conn.del::<_, ()>(key)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Redis error invalidating {}: {}", key, e),
                    Err(_) => warn!("Redis del {} timed out", key),
                }
            }
            ProjectionCache::InMemory(map) => {
                map.remove(key);
            }
            ProjectionCache::Degraded => {}
        }
    }

    /// Whether the backend answers
    ///
    /// A degraded cache is reported unhealthy; the in-process map always
    /// answers.
    pub async fn ping(&self) -> bool {
        match self {
            ProjectionCache::Redis(manager) => {
                let mut conn = manager.clone();
                let cmd = redis::cmd("PING");
                let ping = cmd.query_async::<_, String>(&mut conn);
                matches!(tokio::time::timeout(REDIS_OP_TIMEOUT, ping).await, Ok(Ok(_)))
            }
            ProjectionCache::InMemory(_) => true,
            ProjectionCache::Degraded => false,
        }
    }
}

/// Invalidation generation per projection key
///
/// A fill records the generation before reading the store and writes back
/// only if it is still current. The comparison and the write share one
/// async lock with `invalidate`, so a bump cannot land between them.
#[derive(Debug, Default)]
pub struct Invalidations {
    generations: Mutex<HashMap<String, u64>>,
}

impl Invalidations {
    /// Empty table; every key starts at generation zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation of `key`
    pub async fn generation(&self, key: &str) -> u64 {
        self.generations.lock().await.get(key).copied().unwrap_or(0)
    }

    /// Bump the generation of `key` and drop its cached value
    pub async fn invalidate(&self, cache: &ProjectionCache, key: &str) {
        let mut generations = self.generations.lock().await;
        *generations.entry(key.to_string()).or_insert(0) += 1;
        cache.invalidate(key).await;
    }

    /// Cache `value` unless `key` was invalidated after `observed`
    ///
    /// Returns whether the value was written.
    pub async fn fill<T: Serialize>(
        &self,
        cache: &ProjectionCache,
        key: &str,
        observed: u64,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let generations = self.generations.lock().await;
        let current = generations.get(key).copied().unwrap_or(0);
        if current != observed {
            debug!(key, observed, current, "Projection invalidated during rebuild, not caching");
            return false;
        }
        cache.set(key, value, ttl).await;
        true
    }
}
