//! Pool Decorator
//!
//! Adds the `onchain` record to raw pools: Vault balances, supply, swap fee,
//! weights or amplification. Reads go through alloy `sol!` bindings; the
//! assembly step is pure so it can be tested without a node.
//!
//! Token decimals come from registry metadata unless `force_refresh` is set
//! or the token is unknown, in which case ERC20 `decimals()` is read.

use crate::contracts::{
    IBasePool, IComposableStablePool, IStablePhantomPool, IStablePool, IVault, IWeightedPool, IERC20,
};
use crate::types::{OnchainPoolData, OnchainTokenData, Pool, PoolType, TokenInfo};
use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed-point scale of Balancer fees and weights (1e18)
const FP_DECIMALS: u8 = 18;

#[async_trait]
pub trait PoolDecorator: Send + Sync {
    /// Decorate every pool; output order and length match the input
    async fn decorate(
        &self,
        pools: Vec<Pool>,
        tokens: &HashMap<Address, TokenInfo>,
        force_refresh: bool,
    ) -> Result<Vec<Pool>>;
}

/// Scale a raw integer amount by `decimals`
pub fn to_decimal(value: U256, decimals: u8) -> Result<Decimal> {
    let formatted = format_units(value, decimals)
        .map_err(|e| anyhow::anyhow!("Failed to format {} with {} decimals: {}", value, decimals, e))?;
    Decimal::from_str(&formatted)
        .with_context(|| format!("Amount out of decimal range: {}", formatted))
}

/// Raw contract reads for one pool
#[derive(Debug, Clone, Default)]
pub struct RawPoolState {
    pub tokens: Vec<Address>,
    pub balances: Vec<U256>,
    pub last_change_block: u64,
    pub decimals: u8,
    pub total_supply: U256,
    pub swap_fee: U256,
    pub weights: Option<Vec<U256>>,
    /// (value, precision)
    pub amp: Option<(U256, U256)>,
}

/// Build the decorated pool from raw reads. `token_decimals` must cover
/// every Vault token.
pub fn assemble(
    mut pool: Pool,
    raw: RawPoolState,
    token_decimals: &HashMap<Address, u8>,
    tokens: &HashMap<Address, TokenInfo>,
) -> Result<Pool> {
    if raw.tokens.len() != raw.balances.len() {
        anyhow::bail!(
            "Vault returned {} tokens but {} balances for pool {}",
            raw.tokens.len(),
            raw.balances.len(),
            pool.id
        );
    }
    if let Some(weights) = &raw.weights {
        if weights.len() != raw.tokens.len() {
            anyhow::bail!(
                "Pool {} returned {} weights for {} tokens",
                pool.id,
                weights.len(),
                raw.tokens.len()
            );
        }
    }

    let mut onchain_tokens = HashMap::with_capacity(raw.tokens.len());
    for (i, (address, balance)) in raw.tokens.iter().zip(&raw.balances).enumerate() {
        let decimals = *token_decimals
            .get(address)
            .with_context(|| format!("Missing decimals for token {:?}", address))?;

        let weight = match &raw.weights {
            Some(weights) => Some(to_decimal(weights[i], FP_DECIMALS)?),
            None => None,
        };

        onchain_tokens.insert(
            *address,
            OnchainTokenData {
                balance: to_decimal(*balance, decimals)?,
                decimals,
                weight,
                symbol: tokens.get(address).map(|t| t.symbol.clone()),
            },
        );
    }

    let amp = match raw.amp {
        Some((value, precision)) if !precision.is_zero() => {
            Some(to_decimal(value, 0)? / to_decimal(precision, 0)?)
        }
        _ => None,
    };

    let onchain = OnchainPoolData {
        tokens: onchain_tokens,
        total_supply: to_decimal(raw.total_supply, raw.decimals)?,
        swap_fee: to_decimal(raw.swap_fee, FP_DECIMALS)?,
        amp,
        decimals: raw.decimals,
        last_change_block: raw.last_change_block,
    };

    if let Some(liquidity) = total_liquidity(pool.address, &onchain, tokens) {
        pool.total_liquidity = liquidity;
    }
    pool.total_shares = onchain.total_supply;
    pool.swap_fee = onchain.swap_fee;
    pool.onchain = Some(onchain);
    Ok(pool)
}

/// Which getter reports a pool's circulating BPT. Pools that pre-mint BPT
/// into the Vault overstate it through `totalSupply()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupplyMethod {
    Total,
    Actual,
    Virtual,
}

impl SupplyMethod {
    fn for_pool_type(pool_type: PoolType) -> Self {
        match pool_type {
            PoolType::ComposableStable => SupplyMethod::Actual,
            PoolType::StablePhantom => SupplyMethod::Virtual,
            _ => SupplyMethod::Total,
        }
    }
}

/// USD value of the pool's tokens (its own BPT excluded), or None when any
/// token has no known price
pub fn total_liquidity(
    pool_address: Address,
    onchain: &OnchainPoolData,
    tokens: &HashMap<Address, TokenInfo>,
) -> Option<Decimal> {
    let mut sum = Decimal::ZERO;
    for (address, token) in onchain.tokens.iter().filter(|(a, _)| **a != pool_address) {
        let price = tokens.get(address)?.price_usd?;
        sum += token.balance * price;
    }
    Some(sum)
}

/// Reads Balancer V2 state through an alloy provider
pub struct OnchainPoolDecorator<P> {
    provider: Arc<P>,
    vault: Address,
}

impl<P: Provider + 'static> OnchainPoolDecorator<P> {
    pub fn new(provider: Arc<P>, vault: Address) -> Self {
        Self { provider, vault }
    }

    async fn read_pool(&self, pool: &Pool) -> Result<RawPoolState> {
        let pool_id = B256::from_str(&pool.id)
            .with_context(|| format!("Invalid pool id: {}", pool.id))?;

        let vault = IVault::new(self.vault, self.provider.clone());
        let pool_tokens = vault
            .getPoolTokens(pool_id)
            .call()
            .await
            .with_context(|| format!("Failed to get Vault tokens for {}", pool.id))?;

        let contract = IBasePool::new(pool.address, self.provider.clone());
        let decimals = contract.decimals().call().await.context("Failed to get pool decimals")?;
        let swap_fee = contract
            .getSwapFeePercentage()
            .call()
            .await
            .context("Failed to get swap fee")?;

        let total_supply = match SupplyMethod::for_pool_type(pool.pool_type) {
            SupplyMethod::Actual => IComposableStablePool::new(pool.address, self.provider.clone())
                .getActualSupply()
                .call()
                .await
                .context("Failed to get actual supply")?,
            SupplyMethod::Virtual => IStablePhantomPool::new(pool.address, self.provider.clone())
                .getVirtualSupply()
                .call()
                .await
                .context("Failed to get virtual supply")?,
            SupplyMethod::Total => contract.totalSupply().call().await.context("Failed to get total supply")?,
        };

        let weights = if pool.pool_type.is_weighted_like() {
            let weights = IWeightedPool::new(pool.address, self.provider.clone())
                .getNormalizedWeights()
                .call()
                .await
                .context("Failed to get normalized weights")?;
            Some(weights)
        } else {
            None
        };

        let amp = if pool.pool_type.is_stable_like() {
            let amp = IStablePool::new(pool.address, self.provider.clone())
                .getAmplificationParameter()
                .call()
                .await
                .context("Failed to get amplification parameter")?;
            Some((amp.value, amp.precision))
        } else {
            None
        };

        Ok(RawPoolState {
            tokens: pool_tokens.tokens,
            balances: pool_tokens.balances,
            last_change_block: u64::try_from(pool_tokens.lastChangeBlock).unwrap_or(u64::MAX),
            decimals,
            total_supply,
            swap_fee,
            weights,
            amp,
        })
    }

    async fn token_decimals(
        &self,
        addresses: &[Address],
        tokens: &HashMap<Address, TokenInfo>,
        force_refresh: bool,
    ) -> Result<HashMap<Address, u8>> {
        let mut decimals = HashMap::with_capacity(addresses.len());
        for address in addresses {
            let known = if force_refresh {
                None
            } else {
                tokens.get(address).map(|t| t.decimals)
            };

            let value = match known {
                Some(d) => d,
                None => IERC20::new(*address, self.provider.clone())
                    .decimals()
                    .call()
                    .await
                    .with_context(|| format!("Failed to get decimals for {:?}", address))?,
            };
            decimals.insert(*address, value);
        }
        Ok(decimals)
    }

    async fn decorate_pool(
        &self,
        pool: Pool,
        tokens: &HashMap<Address, TokenInfo>,
        force_refresh: bool,
    ) -> Result<Pool> {
        let raw = self.read_pool(&pool).await?;
        let token_decimals = self.token_decimals(&raw.tokens, tokens, force_refresh).await?;
        debug!(
            "Pool {} on-chain: {} tokens, last change block {}",
            pool.id,
            raw.tokens.len(),
            raw.last_change_block
        );
        assemble(pool, raw, &token_decimals, tokens)
    }
}

#[async_trait]
impl<P: Provider + 'static> PoolDecorator for OnchainPoolDecorator<P> {
    async fn decorate(
        &self,
        pools: Vec<Pool>,
        tokens: &HashMap<Address, TokenInfo>,
        force_refresh: bool,
    ) -> Result<Vec<Pool>> {
        let count = pools.len();
        let decorated = try_join_all(
            pools
                .into_iter()
                .map(|pool| self.decorate_pool(pool, tokens, force_refresh)),
        )
        .await?;

        info!("Decorated {} pool(s) (force_refresh: {})", count, force_refresh);
        Ok(decorated)
    }
}
