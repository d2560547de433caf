//! Test fixtures and collaborator mocks shared by the unit tests

use crate::filters::AccessFilter;
use crate::gauges::GaugeSource;
use crate::pool::{PoolDecorator, PoolRepository, QueryArgs};
use crate::tokens::TokenMetadataSource;
use crate::types::{
    Gauge, NestedPool, OnchainPoolData, Pool, PoolToken, PoolType, SubToken, TokenInfo,
};
use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// Undecorated weighted pool with two flat tokens, `addr(seed)` and
/// `addr(seed + 1)`. The pool address never collides with `addr(_)`.
pub fn raw_pool(id: &str, seed: u8) -> Pool {
    let tokens = vec![addr(seed), addr(seed.wrapping_add(1))];
    Pool {
        id: id.to_string(),
        address: Address::left_padding_from(&[0xee, seed]),
        pool_type: PoolType::Weighted,
        owner: None,
        swap_fee: Decimal::ZERO,
        total_shares: Decimal::ZERO,
        total_liquidity: Decimal::ZERO,
        tokens_list: tokens.clone(),
        tokens: tokens.into_iter().map(PoolToken::new).collect(),
        onchain: None,
    }
}

pub fn onchain_data() -> OnchainPoolData {
    OnchainPoolData {
        tokens: HashMap::new(),
        total_supply: Decimal::ONE_HUNDRED,
        swap_fee: Decimal::new(1, 2),
        amp: None,
        decimals: 18,
        last_change_block: 1,
    }
}

pub fn decorated_pool(id: &str, seed: u8) -> Pool {
    Pool {
        onchain: Some(onchain_data()),
        ..raw_pool(id, seed)
    }
}

/// Token that is itself a pool holding `children`
pub fn nested_token(address: Address, children: Vec<PoolToken>) -> PoolToken {
    PoolToken {
        token: Some(SubToken {
            pool: Some(NestedPool {
                id: format!("{:?}", address),
                address,
                pool_type: PoolType::ComposableStable,
                tokens: children,
            }),
        }),
        ..PoolToken::new(address)
    }
}

pub fn token_info(address: Address, symbol: &str, decimals: u8, price: Option<Decimal>) -> TokenInfo {
    TokenInfo {
        address,
        name: symbol.to_string(),
        symbol: symbol.to_string(),
        decimals,
        price_usd: price,
    }
}

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

/// Returns a fixed pool (or nothing, or an error) and records every call
#[derive(Default)]
pub struct MockRepository {
    pool: Option<Pool>,
    fail: bool,
    calls: AtomicU32,
    last_args: Mutex<Option<QueryArgs>>,
}

impl MockRepository {
    pub fn returning(pool: Pool) -> Self {
        Self {
            pool: Some(pool),
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Option<QueryArgs> {
        self.last_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoolRepository for MockRepository {
    async fn fetch(&self, args: &QueryArgs) -> Result<Option<Pool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = Some(args.clone());
        if self.fail {
            anyhow::bail!("subgraph unavailable");
        }
        Ok(self.pool.clone())
    }
}

/// Attaches `onchain_data()` to every pool
#[derive(Default)]
pub struct MockDecorator {
    calls: AtomicU32,
    force_refresh_seen: Mutex<Vec<bool>>,
}

impl MockDecorator {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn force_refresh_seen(&self) -> Vec<bool> {
        self.force_refresh_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoolDecorator for MockDecorator {
    async fn decorate(
        &self,
        pools: Vec<Pool>,
        _tokens: &HashMap<Address, TokenInfo>,
        force_refresh: bool,
    ) -> Result<Vec<Pool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.force_refresh_seen.lock().unwrap().push(force_refresh);
        Ok(pools
            .into_iter()
            .map(|pool| Pool {
                onchain: Some(onchain_data()),
                ..pool
            })
            .collect())
    }
}

/// Blocks everything or nothing
pub struct MockAccess {
    pub blocked: bool,
}

impl AccessFilter for MockAccess {
    fn is_blocked(&self, _pool: &Pool, _account: Option<Address>) -> bool {
        self.blocked
    }
}

/// Serves metadata for any address and records each request
#[derive(Default)]
pub struct MockTokenSource {
    requests: Mutex<Vec<Vec<Address>>>,
    delay: Option<Duration>,
    fail: bool,
}

impl MockTokenSource {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<Vec<Address>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenMetadataSource for MockTokenSource {
    async fn fetch_metadata(&self, addresses: &[Address]) -> Result<Vec<TokenInfo>> {
        self.requests.lock().unwrap().push(addresses.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("token metadata unavailable");
        }
        Ok(addresses
            .iter()
            .map(|a| token_info(*a, "TKN", 18, None))
            .collect())
    }
}

/// Gauge list that tests can swap between fetches
#[derive(Default)]
pub struct MockGaugeSource {
    gauges: Mutex<Vec<Gauge>>,
    calls: AtomicU32,
}

impl MockGaugeSource {
    pub fn set(&self, gauges: Vec<Gauge>) {
        *self.gauges.lock().unwrap() = gauges;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GaugeSource for MockGaugeSource {
    async fn fetch_gauges(&self) -> Result<Vec<Gauge>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.gauges.lock().unwrap().clone())
    }
}

pub fn gauge(n: u8, pool_id: &str) -> Gauge {
    Gauge {
        id: addr(n),
        pool_id: pool_id.to_string(),
        pool_address: None,
        is_killed: false,
    }
}
