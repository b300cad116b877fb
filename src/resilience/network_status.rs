//! # Network Status Manager
//!
//! Connectivity tracking plus the response cache that backs
//! [`NetworkStatusManager::fetch_with_fallback`].
//!
//! Cached payloads are stored as `serde_json::Value`, so one cache serves every
//! response type; typed access goes through serde on the way in and out.
//!
//! ## Fetch contract
//!
//! - Offline: answer from any non-expired cache entry, or fail with a
//!   network error when there is none.
//! - Online: race the fetch against the timeout. Success is cached and
//!   returned with `from_cache = false`. Failure or timeout falls back to the
//!   cache (stale entries only when `allow_stale`), otherwise the original
//!   error is returned.

use super::cache::TtlCache;
use crate::config::{CacheSettings, NetworkSettings};
use crate::error::{HarvestError, Result};
use crate::utils::{ListenerRegistry, Subscription};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-call overrides for [`NetworkStatusManager::fetch_with_fallback`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
    pub allow_stale: Option<bool>,
}

impl FetchOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_allow_stale(mut self, allow_stale: bool) -> Self {
        self.allow_stale = Some(allow_stale);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
    pub data: T,
    pub from_cache: bool,
    pub is_stale: bool,
}

/// Typed cache hit
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    pub data: T,
    pub is_stale: bool,
    pub age: Duration,
}

struct NetworkInner {
    cache: TtlCache<serde_json::Value>,
    online: watch::Sender<bool>,
    listeners: ListenerRegistry<bool>,
    default_ttl: Duration,
    sweep_interval: Duration,
    fetch_timeout: Duration,
    allow_stale: bool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct NetworkStatusManager {
    inner: Arc<NetworkInner>,
}

impl std::fmt::Debug for NetworkStatusManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStatusManager")
            .field("online", &self.is_online())
            .field("cache_len", &self.cache_len())
            .field("fetch_timeout", &self.inner.fetch_timeout)
            .finish()
    }
}

impl Default for NetworkStatusManager {
    fn default() -> Self {
        Self::new(&CacheSettings::default(), &NetworkSettings::default())
    }
}

impl NetworkStatusManager {
    pub fn new(cache: &CacheSettings, network: &NetworkSettings) -> Self {
        let (online, _) = watch::channel(true);
        Self {
            inner: Arc::new(NetworkInner {
                cache: TtlCache::new(cache.max_entries, cache.stale_ratio),
                online,
                listeners: ListenerRegistry::new("network_status"),
                default_ttl: cache.default_ttl(),
                sweep_interval: cache.sweep_interval(),
                fetch_timeout: network.fetch_timeout(),
                allow_stale: network.allow_stale,
                sweeper: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.inner.online.borrow()
    }

    /// Record a connectivity change; listeners hear only actual changes
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.inner.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("🌐 Connectivity restored");
            } else {
                warn!("📴 Connectivity lost; serving cached data where available");
            }
            self.inner.listeners.notify(&online);
        }
        changed
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    pub fn watch_online(&self) -> watch::Receiver<bool> {
        self.inner.online.subscribe()
    }

    /// Store `data` under `key`; `ttl` defaults to the configured cache TTL
    pub fn cache_data<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) -> Result<()> {
        let value = serde_json::to_value(data)?;
        self.inner
            .cache
            .insert(key, value, ttl.unwrap_or(self.inner.default_ttl));
        Ok(())
    }

    pub fn get_cached_data<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>> {
        match self.inner.cache.get(key) {
            Some(hit) => Ok(Some(CachedData {
                data: serde_json::from_value(hit.data)?,
                is_stale: hit.is_stale,
                age: hit.age,
            })),
            None => Ok(None),
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.cache.invalidate(key)
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn sweep_expired(&self) -> usize {
        let removed = self.inner.cache.sweep_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept expired cache entries");
        }
        removed
    }

    /// Spawn the periodic sweep task; false when already running or impossible
    pub fn start_cache_sweeper(&self) -> bool {
        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.is_some() || self.inner.shutdown.is_cancelled() {
            return false;
        }
        if self.inner.sweep_interval.is_zero() {
            debug!("Cache sweep interval is zero; sweeper disabled");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available; cache sweeper not started");
            return false;
        };

        let weak = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.sweep_interval;
        *sweeper = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        NetworkStatusManager { inner }.sweep_expired();
                    }
                }
            }
            debug!("Cache sweeper stopped");
        }));
        info!(interval_ms = period.as_millis() as u64, "Cache sweeper started");
        true
    }

    /// Stop the sweeper; the cache itself stays usable
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.sweeper.lock().take();
    }

    pub async fn fetch_with_fallback<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        options: FetchOptions,
    ) -> Result<FetchResult<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_online() {
            return match self.fallback_entry::<T>(key) {
                Some(hit) => {
                    debug!(key = %key, stale = hit.is_stale, "Offline; serving cached data");
                    Ok(FetchResult {
                        data: hit.data,
                        from_cache: true,
                        is_stale: hit.is_stale,
                    })
                }
                None => Err(HarvestError::Network(format!(
                    "offline and no cached data for '{key}'"
                ))),
            };
        }

        let timeout = options.timeout.unwrap_or(self.inner.fetch_timeout);
        let error = match tokio::time::timeout(timeout, fetch()).await {
            Ok(Ok(data)) => {
                if let Err(error) = self.cache_data(key, &data, options.ttl) {
                    warn!(key = %key, error = %error, "Could not cache fetched data");
                }
                return Ok(FetchResult {
                    data,
                    from_cache: false,
                    is_stale: false,
                });
            }
            Ok(Err(error)) => error,
            Err(_) => HarvestError::Timeout {
                operation: key.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
        };

        let allow_stale = options.allow_stale.unwrap_or(self.inner.allow_stale);
        match self.fallback_entry::<T>(key) {
            Some(hit) if allow_stale || !hit.is_stale => {
                warn!(key = %key, error = %error, stale = hit.is_stale, "Live fetch failed; serving cached data");
                Ok(FetchResult {
                    data: hit.data,
                    from_cache: true,
                    is_stale: hit.is_stale,
                })
            }
            _ => Err(error),
        }
    }

    /// Cache lookup for degraded reads; an entry of the wrong shape is a miss
    fn fallback_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        self.get_cached_data::<T>(key).unwrap_or_else(|error| {
            warn!(key = %key, error = %error, "Ignoring cached entry that could not be decoded");
            None
        })
    }
}
