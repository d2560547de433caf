//! Query cache
//!
//! Thread-safe keyed result cache using DashMap. Each entry keeps the last
//! successful data and the last error; an execution runs the query function
//! with retry/backoff and records the outcome under its own key.

use super::key::QueryKey;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Caller-tunable behaviour. No `enabled` field: the
/// gate is computed by the caller and passed separately.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Retries after the first failure
    pub retry: u32,
    /// Base retry delay, doubled per failure
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Data younger than this is fresh and not refetched on key/gate changes
    pub stale_time: Duration,
    pub refetch_interval: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            retry: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            stale_time: Duration::ZERO,
            refetch_interval: None,
        }
    }
}

impl QueryOptions {
    /// Delay before retry number `attempt` (0-based): base × 2^attempt, capped
    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Disabled and nothing cached
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot handed to observers
#[derive(Debug)]
pub struct QueryState<T, E> {
    pub key: Option<QueryKey>,
    pub status: QueryStatus,
    pub data: Option<T>,
    pub error: Option<Arc<E>>,
    pub is_fetching: bool,
    pub failure_count: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T: Clone, E> Clone for QueryState<T, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            failure_count: self.failure_count,
            updated_at: self.updated_at,
        }
    }
}

impl<T, E> Default for QueryState<T, E> {
    fn default() -> Self {
        Self {
            key: None,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            failure_count: 0,
            updated_at: None,
        }
    }
}

impl<T, E> QueryState<T, E> {
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Finished (success or error) with nothing in flight
    pub fn is_settled(&self) -> bool {
        !self.is_fetching && matches!(self.status, QueryStatus::Success | QueryStatus::Error)
    }
}

/// Query function: key in, future of the result out
pub type QueryFn<T, E> = Arc<dyn Fn(QueryKey) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

struct CacheEntry<T, E> {
    data: Option<T>,
    error: Option<Arc<E>>,
    failure_count: u32,
    /// Monotonic time of the last successful fetch; None = stale
    fresh_since: Option<Instant>,
    updated_at: Option<DateTime<Utc>>,
    executions: u64,
}

impl<T, E> Default for CacheEntry<T, E> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            failure_count: 0,
            fresh_since: None,
            updated_at: None,
            executions: 0,
        }
    }
}

/// Keyed cache of query results
pub struct QueryClient<T, E> {
    entries: DashMap<QueryKey, CacheEntry<T, E>>,
}

impl<T, E> QueryClient<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Whether the entry should be refetched when a trigger fires
    pub fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.error.is_none() => match entry.fresh_since {
                Some(since) => stale_time.is_zero() || since.elapsed() >= stale_time,
                None => true,
            },
            _ => true,
        }
    }

    /// Observer snapshot for a key
    pub fn state(&self, key: &QueryKey, is_fetching: bool) -> QueryState<T, E> {
        let mut state = QueryState {
            key: Some(key.clone()),
            is_fetching,
            ..QueryState::default()
        };

        if let Some(entry) = self.entries.get(key) {
            state.data = entry.data.clone();
            state.error = entry.error.clone();
            state.failure_count = entry.failure_count;
            state.updated_at = entry.updated_at;
        }

        state.status = if state.error.is_some() && !is_fetching {
            QueryStatus::Error
        } else if state.data.is_some() {
            QueryStatus::Success
        } else if is_fetching {
            QueryStatus::Loading
        } else {
            QueryStatus::Idle
        };

        state
    }

    /// Cached data, if any
    pub fn get_data(&self, key: &QueryKey) -> Option<T> {
        self.entries.get(key).and_then(|entry| entry.data.clone())
    }

    /// Seed or overwrite data for a key
    pub fn set_data(&self, key: &QueryKey, data: T) {
        let mut entry = self.entries.entry(key.clone()).or_default();
        entry.data = Some(data);
        entry.error = None;
        entry.failure_count = 0;
        entry.fresh_since = Some(Instant::now());
        entry.updated_at = Some(Utc::now());
    }

    fn set_error(&self, key: &QueryKey, error: Arc<E>, failure_count: u32) {
        let mut entry = self.entries.entry(key.clone()).or_default();
        entry.error = Some(error);
        entry.failure_count = failure_count;
        entry.fresh_since = None;
        entry.updated_at = Some(Utc::now());
    }

    /// Mark an entry stale so the next trigger refetches it
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.fresh_since = None;
        }
    }

    /// How many executions have started for a key
    pub fn execution_count(&self, key: &QueryKey) -> u64 {
        self.entries.get(key).map(|entry| entry.executions).unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the query function for `key`, retrying per `options`, and record
    /// the outcome. Errors are stored, not returned.
    pub async fn execute(&self, key: QueryKey, options: &QueryOptions, query_fn: &QueryFn<T, E>) {
        self.entries.entry(key.clone()).or_default().executions += 1;
        debug!("Query {} started", key);

        let mut failures = 0u32;
        loop {
            match query_fn(key.clone()).await {
                Ok(data) => {
                    debug!("Query {} succeeded", key);
                    self.set_data(&key, data);
                    return;
                }
                Err(e) => {
                    failures += 1;
                    if failures > options.retry {
                        warn!("Query {} failed after {} attempt(s): {}", key, failures, e);
                        self.set_error(&key, Arc::new(e), failures);
                        return;
                    }
                    let delay = options.retry_delay_for(failures - 1);
                    warn!(
                        "Query {} failed (attempt {}), retrying in {:?}: {}",
                        key, failures, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl<T, E> Default for QueryClient<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
