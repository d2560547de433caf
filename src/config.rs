//! Configuration management
//!
//! Network presets are built in; a TOML file can override them and adds the
//! pool deny list, access list path and query defaults. `.env` values
//! (RPC_URL, SUBGRAPH_URL, GAUGES_SUBGRAPH_URL) win over both.
//!
//! Created: 2026-10-19

use crate::query::QueryOptions;
use alloy::primitives::{address, Address};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Balancer V2 Vault (same address on every supported chain)
pub const BALANCER_VAULT: Address = address!("BA12222222228d8Ba445958a75a0704d566BF2C8");

/// Pool types the front-end never lists
pub static DEFAULT_EXCLUDED_POOL_TYPES: Lazy<Vec<String>> = Lazy::new(|| {
    [
        "Element",
        "AaveLinear",
        "Linear",
        "ERC4626Linear",
        "FX",
        "Gyro2",
        "Gyro3",
        "GyroE",
        "HighAmpComposableStable",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
});

/// Active network settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub subgraph_url: String,
    pub gauges_subgraph_url: String,
    #[serde(default = "default_vault")]
    pub vault_address: Address,
}

fn default_vault() -> Address {
    BALANCER_VAULT
}

impl NetworkConfig {
    /// Built-in preset for a chain name (mainnet, polygon, arbitrum)
    pub fn preset(chain: &str) -> Result<Self> {
        let (name, chain_id, rpc_url, subgraph) = match chain.to_lowercase().as_str() {
            "mainnet" | "ethereum" => ("mainnet", 1, "https://eth.llamarpc.com", "balancer-v2"),
            "polygon" => ("polygon", 137, "https://polygon-rpc.com", "balancer-polygon-v2"),
            "arbitrum" => ("arbitrum", 42161, "https://arb1.arbitrum.io/rpc", "balancer-arbitrum-v2"),
            other => anyhow::bail!(
                "Unsupported chain: '{}'. Supported: mainnet, polygon, arbitrum",
                other
            ),
        };

        let gauges = if chain_id == 1 {
            "balancer-gauges".to_string()
        } else {
            format!("balancer-gauges-{}", name)
        };

        Ok(Self {
            name: name.to_string(),
            chain_id,
            rpc_url: rpc_url.to_string(),
            subgraph_url: format!("https://api.thegraph.com/subgraphs/name/balancer-labs/{}", subgraph),
            gauges_subgraph_url: format!("https://api.thegraph.com/subgraphs/name/balancer-labs/{}", gauges),
            vault_address: BALANCER_VAULT,
        })
    }

    /// First `max_chars` characters of the RPC URL, for logging without
    /// printing API keys in full
    pub fn rpc_url_preview(&self, max_chars: usize) -> String {
        self.rpc_url.chars().take(max_chars).collect()
    }
}

/// `[pools]` section
#[derive(Debug, Clone, Deserialize)]
pub struct PoolsConfig {
    #[serde(default = "default_excluded_pool_types")]
    pub excluded_pool_types: Vec<String>,
    /// JSON allow/block lists for the access filter
    #[serde(default)]
    pub access_list_file: Option<String>,
}

fn default_excluded_pool_types() -> Vec<String> {
    DEFAULT_EXCLUDED_POOL_TYPES.clone()
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            excluded_pool_types: default_excluded_pool_types(),
            access_list_file: None,
        }
    }
}

/// `[query]` section, defaults mirror the usual reactive-query defaults
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default)]
    pub stale_time_ms: u64,
    #[serde(default)]
    pub refetch_interval_ms: Option<u64>,
}

fn default_retry() -> u32 { 3 }

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            retry: default_retry(),
            stale_time_ms: 0,
            refetch_interval_ms: None,
        }
    }
}

impl QueryConfig {
    pub fn to_options(&self) -> QueryOptions {
        QueryOptions {
            retry: self.retry,
            stale_time: Duration::from_millis(self.stale_time_ms),
            refetch_interval: self.refetch_interval_ms.map(Duration::from_millis),
            ..QueryOptions::default()
        }
    }
}

/// Whole application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub pools: PoolsConfig,
    pub query: QueryConfig,
}

/// TOML file layout; every section optional
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    network: Option<NetworkConfig>,
    #[serde(default)]
    pools: Option<PoolsConfig>,
    #[serde(default)]
    query: Option<QueryConfig>,
}

impl AppConfig {
    /// Preset-only configuration for a chain
    pub fn for_chain(chain: &str) -> Result<Self> {
        Ok(Self {
            network: NetworkConfig::preset(chain)?,
            pools: PoolsConfig::default(),
            query: QueryConfig::default(),
        })
    }

    /// Parse a TOML string on top of the chain preset
    pub fn from_toml_str(chain: &str, content: &str) -> Result<Self> {
        let parsed: TomlConfig =
            toml::from_str(content).context("Failed to parse TOML configuration")?;

        let mut config = Self::for_chain(chain)?;
        if let Some(network) = parsed.network {
            if network.chain_id != config.network.chain_id {
                anyhow::bail!(
                    "Config network chain_id {} does not match --chain {} ({})",
                    network.chain_id,
                    chain,
                    config.network.chain_id
                );
            }
            config.network = network;
        }
        if let Some(pools) = parsed.pools {
            config.pools = pools;
        }
        if let Some(query) = parsed.query {
            config.query = query;
        }
        Ok(config)
    }

    /// Apply RPC_URL / SUBGRAPH_URL / GAUGES_SUBGRAPH_URL from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Ok(url) = std::env::var("SUBGRAPH_URL") {
            self.network.subgraph_url = url;
        }
        if let Ok(url) = std::env::var("GAUGES_SUBGRAPH_URL") {
            self.network.gauges_subgraph_url = url;
        }
    }
}

/// Load configuration: preset → optional TOML file → `.env` overrides
pub fn load_config(chain: &str, path: Option<&Path>) -> Result<AppConfig> {
    dotenv::dotenv().ok();

    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            AppConfig::from_toml_str(chain, &content)?
        }
        None => AppConfig::for_chain(chain)?,
    };

    config.apply_env_overrides();
    Ok(config)
}
