//! Pool Store
//!
//! Thread-safe storage for already-loaded pools using DashMap.
//! Populated by list views; the pool query only reads from it.

use crate::types::Pool;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe pool store
///
/// Key is the lower-cased pool id, so lookups are case-insensitive.
#[derive(Debug)]
pub struct PoolStore {
    pools: Arc<DashMap<String, Pool>>,
}

fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

impl PoolStore {
    /// Create a new empty PoolStore
    pub fn new() -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
        }
    }

    /// Add or replace a pool
    pub fn add_pool(&self, pool: Pool) {
        debug!(
            "Storing pool {} ({}, decorated: {})",
            pool.id,
            pool.pool_type,
            pool.is_decorated()
        );
        self.pools.insert(normalize_id(&pool.id), pool);
    }

    /// Add or replace many pools
    pub fn add_pools(&self, pools: impl IntoIterator<Item = Pool>) {
        for pool in pools {
            self.add_pool(pool);
        }
    }

    /// Previously loaded pool by id (case-insensitive)
    pub fn find_pool(&self, id: &str) -> Option<Pool> {
        self.pools.get(&normalize_id(id)).map(|entry| entry.clone())
    }

    /// Get all pools
    pub fn get_all_pools(&self) -> Vec<Pool> {
        self.pools.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Check if a pool exists
    pub fn contains(&self, id: &str) -> bool {
        self.pools.contains_key(&normalize_id(id))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Default for PoolStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PoolStore {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
        }
    }
}
