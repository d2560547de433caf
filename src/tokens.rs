//! Token Registry
//!
//! Process-wide set of known tokens. Pools register the tokens they reference
//! through `inject_tokens`; unknown addresses are resolved through a
//! `TokenMetadataSource` (ERC20 reads in production). Entries are never
//! removed.
//!
//! The `loading` flag is raised only while balances or prices are being
//! refreshed (`begin_dynamic_load`). Injection does not touch it, so a
//! query gated on `!loading` can inject tokens without closing its own gate.
//!
//! Created: 2026-10-19

use crate::contracts::IERC20;
use crate::types::TokenInfo;
use alloy::primitives::Address;
use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    /// Metadata for each address, in any order
    async fn fetch_metadata(&self, addresses: &[Address]) -> Result<Vec<TokenInfo>>;
}

/// Reads `name`, `symbol` and `decimals` from the token contracts
pub struct Erc20MetadataSource<P> {
    provider: Arc<P>,
}

impl<P: Provider + 'static> Erc20MetadataSource<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    async fn read_token(&self, address: Address) -> Result<TokenInfo> {
        let token = IERC20::new(address, self.provider.clone());

        let decimals = token
            .decimals()
            .call()
            .await
            .with_context(|| format!("Failed to get decimals for {:?}", address))?;

        // Some older tokens return bytes32 names; fall back to the address
        let symbol = match token.symbol().call().await {
            Ok(symbol) => symbol,
            Err(e) => {
                warn!("Token {:?}: symbol() unreadable ({}), using address", address, e);
                format!("{:?}", address)
            }
        };
        let name = match token.name().call().await {
            Ok(name) => name,
            Err(_) => symbol.clone(),
        };

        Ok(TokenInfo {
            address,
            name,
            symbol,
            decimals,
            price_usd: None,
        })
    }
}

#[async_trait]
impl<P: Provider + 'static> TokenMetadataSource for Erc20MetadataSource<P> {
    async fn fetch_metadata(&self, addresses: &[Address]) -> Result<Vec<TokenInfo>> {
        try_join_all(addresses.iter().map(|a| self.read_token(*a))).await
    }
}

/// Shared token registry
pub struct TokenRegistry {
    tokens: DashMap<Address, TokenInfo>,
    source: Arc<dyn TokenMetadataSource>,
    loading: watch::Sender<bool>,
    active_loads: AtomicUsize,
    /// Serializes injections so concurrent requests for the same address
    /// fetch it once
    inject_lock: Mutex<()>,
}

impl TokenRegistry {
    pub fn new(source: Arc<dyn TokenMetadataSource>) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            tokens: DashMap::new(),
            source,
            loading,
            active_loads: AtomicUsize::new(0),
            inject_lock: Mutex::new(()),
        }
    }

    /// Fetch metadata for every address not yet known. Duplicates in
    /// `addresses` are ignored; known addresses cost nothing.
    pub async fn inject_tokens(&self, addresses: &[Address]) -> Result<()> {
        let _lock = self.inject_lock.lock().await;

        let mut seen = HashSet::with_capacity(addresses.len());
        let missing: Vec<Address> = addresses
            .iter()
            .copied()
            .filter(|a| seen.insert(*a) && !self.tokens.contains_key(a))
            .collect();

        if missing.is_empty() {
            debug!("Token injection: all {} address(es) known", seen.len());
            return Ok(());
        }

        info!("Injecting {} new token(s)", missing.len());
        let fetched = self
            .source
            .fetch_metadata(&missing)
            .await
            .with_context(|| format!("Failed to inject {} token(s)", missing.len()))?;

        for info in fetched {
            self.tokens.insert(info.address, info);
        }
        Ok(())
    }

    /// Seed entries directly (token lists, tests)
    pub fn add_tokens(&self, tokens: impl IntoIterator<Item = TokenInfo>) {
        for info in tokens {
            self.tokens.insert(info.address, info);
        }
    }

    /// Record USD prices; unknown addresses are skipped
    pub fn set_prices(&self, prices: &HashMap<Address, Decimal>) {
        let mut updated = 0usize;
        for (address, price) in prices {
            if let Some(mut entry) = self.tokens.get_mut(address) {
                entry.price_usd = Some(*price);
                updated += 1;
            }
        }
        debug!("Prices updated for {}/{} token(s)", updated, prices.len());
    }

    pub fn get(&self, address: &Address) -> Option<TokenInfo> {
        self.tokens.get(address).map(|entry| entry.clone())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
    }

    /// Snapshot of every known token
    pub fn tokens(&self) -> HashMap<Address, TokenInfo> {
        self.tokens
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True while any dynamic load (balances, prices) is running
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Raise `loading` until the returned guard is dropped. Guards nest.
    pub fn begin_dynamic_load(&self) -> DynamicLoadGuard<'_> {
        if self.active_loads.fetch_add(1, Ordering::SeqCst) == 0 {
            self.set_loading(true);
        }
        DynamicLoadGuard { registry: self }
    }

    fn set_loading(&self, value: bool) {
        self.loading.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }
}

pub struct DynamicLoadGuard<'a> {
    registry: &'a TokenRegistry,
}

impl Drop for DynamicLoadGuard<'_> {
    fn drop(&mut self) {
        if self.registry.active_loads.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.registry.set_loading(false);
        }
    }
}
