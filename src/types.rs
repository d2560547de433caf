// Core data structures for pool resolution
// Shapes follow the Balancer subgraph so repository responses deserialize directly

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Balancer pool types as reported by the subgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    Weighted,
    Investment,
    Stable,
    MetaStable,
    StablePhantom,
    ComposableStable,
    LiquidityBootstrapping,
    Managed,
    Element,
    AaveLinear,
    ERC4626Linear,
    Linear,
    FX,
    Gyro2,
    Gyro3,
    GyroE,
    /// Anything newer than this crate knows about
    #[serde(other)]
    Unknown,
}

impl PoolType {
    /// Stable-family pools (amplification parameter, no weights)
    pub fn is_stable_like(&self) -> bool {
        matches!(
            self,
            PoolType::Stable
                | PoolType::MetaStable
                | PoolType::StablePhantom
                | PoolType::ComposableStable
        )
    }

    /// Pools managed by an owner (asset managers / investment pools)
    pub fn is_managed(&self) -> bool {
        matches!(self, PoolType::Managed | PoolType::Investment)
    }

    /// Pools exposing `getNormalizedWeights()`
    pub fn is_weighted_like(&self) -> bool {
        matches!(
            self,
            PoolType::Weighted
                | PoolType::Investment
                | PoolType::LiquidityBootstrapping
                | PoolType::Managed
        )
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Subgraph names match the variant names
        write!(f, "{:?}", self)
    }
}

/// Pool nested inside a token of a composable pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedPool {
    pub id: String,
    pub address: Address,
    pub pool_type: PoolType,
    #[serde(default)]
    pub tokens: Vec<PoolToken>,
}

/// Token-level metadata attached to a pool token; `pool` is set when the
/// token is itself a pool (BPT)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubToken {
    #[serde(default)]
    pub pool: Option<NestedPool>,
}

/// One entry of a pool's token tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolToken {
    pub address: Address,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub token: Option<SubToken>,
}

impl PoolToken {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            symbol: None,
            decimals: None,
            balance: Decimal::ZERO,
            weight: None,
            token: None,
        }
    }

    /// Tokens of the nested pool, if this token is a pool
    pub fn nested_tokens(&self) -> Option<&[PoolToken]> {
        self.token
            .as_ref()
            .and_then(|t| t.pool.as_ref())
            .map(|p| p.tokens.as_slice())
            .filter(|tokens| !tokens.is_empty())
    }
}

/// Per-token on-chain state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnchainTokenData {
    pub balance: Decimal,
    pub decimals: u8,
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Fields that need a live chain read to be accurate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnchainPoolData {
    pub tokens: HashMap<Address, OnchainTokenData>,
    pub total_supply: Decimal,
    pub swap_fee: Decimal,
    #[serde(default)]
    pub amp: Option<Decimal>,
    pub decimals: u8,
    /// Block the Vault last saw a balance change for this pool
    pub last_change_block: u64,
}

/// A liquidity pool record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    pub address: Address,
    pub pool_type: PoolType,
    #[serde(default)]
    pub owner: Option<Address>,
    #[serde(default)]
    pub swap_fee: Decimal,
    #[serde(default)]
    pub total_shares: Decimal,
    #[serde(default)]
    pub total_liquidity: Decimal,
    #[serde(default)]
    pub tokens_list: Vec<Address>,
    #[serde(default)]
    pub tokens: Vec<PoolToken>,
    /// Present only once decorated
    #[serde(default)]
    pub onchain: Option<OnchainPoolData>,
}

impl Pool {
    pub fn is_decorated(&self) -> bool {
        self.onchain.is_some()
    }

    /// Case-insensitive id comparison
    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id.trim())
    }

    /// Every token address this pool depends on: the direct token list, the
    /// leaves of the token tree and the pool's own address (composable pools
    /// hold their own BPT). Order is stable; duplicates are left for the
    /// registry to drop.
    pub fn referenced_token_addresses(&self) -> Vec<Address> {
        let mut addresses = self.tokens_list.clone();
        addresses.extend(token_tree_leafs(&self.tokens));
        addresses.push(self.address);
        addresses
    }
}

/// Leaf token addresses of a (possibly nested) token tree.
///
/// A token whose nested pool has no tokens counts as a leaf. Nested pools are
/// visited once each, so a malformed self-referencing tree terminates.
pub fn token_tree_leafs(tokens: &[PoolToken]) -> Vec<Address> {
    let mut leafs = Vec::new();
    let mut visited: HashSet<Address> = HashSet::new();
    let mut stack: Vec<&PoolToken> = tokens.iter().rev().collect();

    while let Some(token) = stack.pop() {
        match token.nested_tokens() {
            Some(children) => {
                if visited.insert(token.address) {
                    stack.extend(children.iter().rev());
                }
            }
            None => leafs.push(token.address),
        }
    }

    leafs
}

/// Known token metadata held by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub price_usd: Option<Decimal>,
}

/// Liquidity gauge record (only the address feeds the pool query key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub id: Address,
    pub pool_id: String,
    #[serde(default)]
    pub pool_address: Option<Address>,
    #[serde(default)]
    pub is_killed: bool,
}
