//! Pool Access Lists
//!
//! Decides whether a connected account may open a pool.
//! Stable-like and managed pools need allow-listing: they are blocked unless
//! their id is on the matching allow list or the account owns the pool.
//! Ids on the block list are blocked for everyone.
//!
//! Config file: config/pool_access.json

use crate::types::Pool;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Pure access predicate
pub trait AccessFilter: Send + Sync {
    fn is_blocked(&self, pool: &Pool, account: Option<Address>) -> bool;
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PoolAccessConfig {
    #[serde(default)]
    pub version: String,
    /// false = only the block list applies
    #[serde(default = "default_true")]
    pub enforce_allow_lists: bool,
    /// Stable-like pools allowed without ownership
    #[serde(default)]
    pub stable_allow_list: Vec<String>,
    /// Managed / investment pools allowed without ownership
    #[serde(default)]
    pub investment_allow_list: Vec<String>,
    #[serde(default)]
    pub block_list: Vec<BlockedPool>,
}

fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlockedPool {
    pub id: String,
    pub reason: String,
    #[serde(default)]
    pub date_added: Option<String>,
}

// ---------------------------------------------------------------------------
// Precomputed lookup sets (built once at load time)
// ---------------------------------------------------------------------------

/// Fast-lookup filter built from the JSON config.
/// All id comparisons are lowercase hex with 0x prefix.
#[derive(Debug, Clone)]
pub struct AllowListFilter {
    enforce_allow_lists: bool,
    stable_allowed: HashSet<String>,
    investment_allowed: HashSet<String>,
    blocked: HashSet<String>,
}

impl AllowListFilter {
    /// Load from a JSON file path
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read access list file: {}", path))?;

        let raw: PoolAccessConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse access list JSON: {}", path))?;

        Ok(Self::from_config(raw))
    }

    /// Build from an already-parsed config
    pub fn from_config(raw: PoolAccessConfig) -> Self {
        let stable_allowed: HashSet<String> =
            raw.stable_allow_list.iter().map(|id| normalize_id(id)).collect();
        let investment_allowed: HashSet<String> =
            raw.investment_allow_list.iter().map(|id| normalize_id(id)).collect();
        let blocked: HashSet<String> = raw.block_list.iter().map(|p| normalize_id(&p.id)).collect();

        info!(
            "Access lists loaded: {} stable allowed, {} investment allowed, {} blocked, enforce={}",
            stable_allowed.len(),
            investment_allowed.len(),
            blocked.len(),
            raw.enforce_allow_lists,
        );

        Self {
            enforce_allow_lists: raw.enforce_allow_lists,
            stable_allowed,
            investment_allowed,
            blocked,
        }
    }

    fn is_allow_listed(&self, id: &str) -> bool {
        self.stable_allowed.contains(id) || self.investment_allowed.contains(id)
    }
}

impl AccessFilter for AllowListFilter {
    fn is_blocked(&self, pool: &Pool, account: Option<Address>) -> bool {
        let id = normalize_id(&pool.id);

        // 1. Explicit block list
        if self.blocked.contains(&id) {
            debug!("Access: {} blocked: on block list", pool.id);
            return true;
        }

        // 2. Only stable-like and managed pools need allow-listing
        let requires_allow_listing = self.enforce_allow_lists
            && (pool.pool_type.is_stable_like() || pool.pool_type.is_managed());
        if !requires_allow_listing || self.is_allow_listed(&id) {
            return false;
        }

        // 3. Owners can always open their own pool
        let owned_by_account = matches!((pool.owner, account), (Some(owner), Some(acc)) if owner == acc);
        if owned_by_account {
            return false;
        }

        debug!("Access: {} blocked: {} pool not allow-listed", pool.id, pool.pool_type);
        true
    }
}

// ---------------------------------------------------------------------------
// Default (block list only, used when no config file exists)
// ---------------------------------------------------------------------------

impl Default for AllowListFilter {
    fn default() -> Self {
        warn!("Access lists: no config loaded, allow-list enforcement disabled");
        Self::from_config(PoolAccessConfig {
            version: "1.0".to_string(),
            enforce_allow_lists: false,
            stable_allow_list: Vec::new(),
            investment_allow_list: Vec::new(),
            block_list: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Normalize an id string to lowercase with 0x prefix.
fn normalize_id(s: &str) -> String {
    let s = s.trim().to_lowercase();
    if s.starts_with("0x") {
        s
    } else {
        format!("0x{}", s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
