//! pool-query CLI
//!
//! Resolves one Balancer pool by id and prints it as JSON. With `--watch`
//! the query stays mounted and every refreshed result is printed.
//!
//! Wiring:
//! - Pool repository: Balancer subgraph (pools filtered by type deny list)
//! - Decorator + token metadata: Vault / pool / ERC20 reads over HTTP RPC
//! - Gauges: gauges subgraph, folded into the pool query key
//! - Access lists: `[pools].access_list_file` or block-list-only default
//!
//! Created: 2026-10-19

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use anyhow::{Context, Result};
use clap::Parser;
use pool_query::config::load_config;
use pool_query::error::PoolQueryError;
use pool_query::filters::{AccessFilter, AllowListFilter};
use pool_query::gauges::{GaugesQuery, SubgraphGaugeSource};
use pool_query::pool::{OnchainPoolDecorator, PoolStore, SubgraphPoolRepository};
use pool_query::query::QueryState;
use pool_query::subgraph::SubgraphClient;
use pool_query::tokens::{Erc20MetadataSource, TokenRegistry};
use pool_query::types::Pool;
use pool_query::PoolQuery;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Refresh period for --watch when the config sets none
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Resolve a Balancer pool by id
#[derive(Parser)]
#[command(name = "pool-query")]
struct Args {
    /// Pool id (bytes32 hex)
    pool_id: String,

    /// Chain to query (mainnet, polygon, arbitrum)
    #[arg(short, long, env = "CHAIN", default_value = "mainnet")]
    chain: String,

    /// TOML config file
    #[arg(long, env = "POOL_QUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Connected account, used for owner-only pools
    #[arg(long, env = "ACCOUNT")]
    account: Option<String>,

    /// Keep the query mounted and print every refresh
    #[arg(long)]
    watch: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, stdout carries the JSON result)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let config = load_config(&args.chain, args.config.as_deref())?;
    info!(
        "Configuration loaded: {} (chain_id: {})",
        config.network.name, config.network.chain_id
    );
    info!("RPC URL: {}", config.network.rpc_url_preview(40));

    let account: Option<Address> = args
        .account
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("Invalid --account address")?;

    // Create HTTP provider
    let provider = Arc::new(
        ProviderBuilder::new().connect_http(config.network.rpc_url.parse().context("Invalid RPC URL")?),
    );

    let registry = Arc::new(TokenRegistry::new(Arc::new(Erc20MetadataSource::new(
        provider.clone(),
    ))));
    let repository = Arc::new(SubgraphPoolRepository::new(
        SubgraphClient::new(config.network.subgraph_url.clone())?,
        config.network.chain_id,
    ));
    let decorator = Arc::new(OnchainPoolDecorator::new(
        provider.clone(),
        config.network.vault_address,
    ));
    let access: Arc<dyn AccessFilter> = match &config.pools.access_list_file {
        Some(path) => Arc::new(AllowListFilter::load(path)?),
        None => Arc::new(AllowListFilter::default()),
    };

    let mut options = config.query.to_options();
    if args.watch && options.refetch_interval.is_none() {
        options.refetch_interval = Some(DEFAULT_WATCH_INTERVAL);
    }

    // Gauges first, so the first pool run already has its final key
    let gauges = GaugesQuery::new(
        Arc::new(SubgraphGaugeSource::new(SubgraphClient::new(
            config.network.gauges_subgraph_url.clone(),
        )?)),
        options.clone(),
    );
    let gauge_state = gauges.settled().await?;
    if let Some(e) = &gauge_state.error {
        warn!("Gauges unavailable, continuing without them: {:#}", e);
    }

    let (_account_tx, account_rx) = watch::channel(account);
    let query = Arc::new(
        PoolQuery::new(
            &config,
            PoolStore::new(),
            registry.clone(),
            repository,
            decorator,
            access,
        )
        .with_gauge_addresses(gauges.addresses())
        .with_account(account_rx),
    );

    let (_enabled_tx, enabled) = watch::channel(true);
    let handle = query.use_pool_query(&args.pool_id, enabled, options);

    if !args.watch {
        let state = handle.settled().await?;
        return print_state(&state);
    }

    let mut updates = WatchStream::new(handle.subscribe());
    let mut last_printed = None;
    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(state) if state.is_settled() && !state.is_fetching => {
                    // The driver republishes unchanged states; print each result once
                    let version = (state.updated_at, state.failure_count);
                    if last_printed == Some(version) {
                        continue;
                    }
                    last_printed = Some(version);
                    if let Err(e) = print_state(&state) {
                        warn!("{:#}", e);
                    }
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down ({} tokens known)", registry.len());
                break;
            }
        }
    }

    Ok(())
}

fn print_state(state: &QueryState<Pool, PoolQueryError>) -> Result<()> {
    if let Some(e) = &state.error {
        anyhow::bail!("Pool query failed: {}", e);
    }
    let pool = state.data.as_ref().context("Pool query finished without data")?;
    println!("{}", serde_json::to_string_pretty(pool)?);
    Ok(())
}
