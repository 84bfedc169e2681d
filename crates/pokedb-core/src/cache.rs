//! Memoizing, coalescing fetch layer over the canonical source.
//!
//! Every lookup for a key goes through one shared cell. The first caller
//! performs the network request; anyone asking for the same key while it is
//! in flight waits on the same cell and receives the same outcome, success or
//! failure. Network calls are bounded by a semaphore independent of the
//! collector's worker pool, so a wide fan-out of entity tasks never turns into
//! an equally wide fan-out of requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::document::Document;
use crate::fetcher::{Transport, TransportError};

/// Terminal outcome of a failed fetch, shared by every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The source answered with a status that retrying will not fix.
    #[error("upstream returned HTTP {status} for {key}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Cache key (absolute URL)
        key: String,
    },
    /// Retryable failures persisted through every attempt.
    #[error("gave up on {key} after {attempts} attempts: {reason}")]
    Transient {
        /// Cache key (absolute URL)
        key: String,
        /// Attempts made
        attempts: u32,
        /// Last failure seen
        reason: String,
    },
    /// The body could not be decoded.
    #[error("could not decode {key}: {reason}")]
    Decode {
        /// Cache key (absolute URL)
        key: String,
        /// Decoder message
        reason: String,
    },
}

impl FetchError {
    /// Whether the failure was transient in nature.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Stable category label.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "upstream",
            Self::Transient { .. } => "transient",
            Self::Decode { .. } => "decode",
        }
    }

    /// The key the failure belongs to.
    pub fn key(&self) -> &str {
        match self {
            Self::Upstream { key, .. } | Self::Transient { key, .. } | Self::Decode { key, .. } => {
                key
            },
        }
    }
}

/// Whether resolved entries outlive their request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Keep every outcome for the rest of the run.
    #[default]
    Memoize,
    /// Share in-flight requests, then forget the outcome.
    CoalesceOnly,
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Counters describing cache behavior over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls to [`FetchCache::get`]
    pub requests: u64,
    /// Lookups answered from a resolved entry
    pub hits: u64,
    /// Lookups that joined a request already in flight
    pub coalesced: u64,
    /// Transport calls, retries included
    pub network_calls: u64,
    /// Keys that resolved to a failure
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    coalesced: AtomicU64,
    network_calls: AtomicU64,
    failures: AtomicU64,
}

type Outcome = Result<Arc<Document>, FetchError>;
type Slot = Arc<OnceCell<Outcome>>;

/// Run-scoped document cache keyed by absolute URL.
pub struct FetchCache {
    transport: Arc<dyn Transport>,
    slots: Mutex<HashMap<String, Slot>>,
    permits: Semaphore,
    retry: RetryPolicy,
    policy: CachePolicy,
    counters: Counters,
}

impl FetchCache {
    /// Default ceiling on simultaneous network calls.
    pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

    /// Create a cache allowing `max_concurrency` simultaneous network calls.
    pub fn new(transport: Arc<dyn Transport>, max_concurrency: usize) -> Self {
        Self {
            transport,
            slots: Mutex::new(HashMap::new()),
            permits: Semaphore::new(max_concurrency.max(1)),
            retry: RetryPolicy::default(),
            policy: CachePolicy::default(),
            counters: Counters::default(),
        }
    }

    /// Create a cache from fetch settings.
    pub fn from_config(transport: Arc<dyn Transport>, config: &FetchConfig) -> Self {
        Self::new(transport, config.max_concurrency).with_retry(RetryPolicy::from(config))
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the retention policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Retrieve the document at `key`, fetching it at most once per run.
    pub async fn get(&self, key: &str) -> Result<Arc<Document>, FetchError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let (slot, owner) = {
            let mut slots = self.lock_slots();
            if let Some(existing) = slots.get(key) {
                (Arc::clone(existing), false)
            } else {
                let slot: Slot = Arc::new(OnceCell::new());
                slots.insert(key.to_string(), Arc::clone(&slot));
                (slot, true)
            }
        };

        if let Some(done) = slot.get() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit {}", key);
            return done.clone();
        }
        if !owner {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        let outcome = slot.get_or_init(|| self.resolve(key)).await.clone();

        if self.policy == CachePolicy::CoalesceOnly {
            let mut slots = self.lock_slots();
            if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                slots.remove(key);
            }
        }

        outcome
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            network_calls: self.counters.network_calls.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn resolve(&self, key: &str) -> Outcome {
        let outcome = self.fetch_with_retries(key).await;
        if let Err(err) = &outcome {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!("fetch failed: {}", err);
        }
        outcome
    }

    async fn fetch_with_retries(&self, key: &str) -> Outcome {
        let attempts = self.retry.max_retries.saturating_add(1);
        let mut last_reason = String::new();

        for attempt in 0..attempts {
            let result = {
                let _permit = self.permits.acquire().await.map_err(|_| FetchError::Transient {
                    key: key.to_string(),
                    attempts: attempt,
                    reason: "fetch pool closed".to_string(),
                })?;
                self.counters.network_calls.fetch_add(1, Ordering::Relaxed);
                self.transport.get_json(key).await
            };

            match result {
                Ok(value) => return Ok(Arc::new(Document::new(value))),
                Err(TransportError::Decode(reason)) => {
                    return Err(FetchError::Decode {
                        key: key.to_string(),
                        reason,
                    });
                },
                Err(err @ TransportError::Status { status }) if !err.is_retryable() => {
                    return Err(FetchError::Upstream {
                        status,
                        key: key.to_string(),
                    });
                },
                Err(err) => {
                    debug!("attempt {} for {} failed: {}", attempt + 1, key, err);
                    last_reason = err.to_string();
                },
            }

            // Backoff before next attempt (except after the last one)
            if attempt + 1 < attempts {
                tokio::time::sleep(self.retry.delay_for(attempt)).await;
            }
        }

        Err(FetchError::Transient {
            key: key.to_string(),
            attempts,
            reason: last_reason,
        })
    }
}
