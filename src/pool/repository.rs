//! Pool Repository
//!
//! Remote fetch of a single pool by structured filter arguments. The subgraph
//! implementation expands the token tree three levels deep, enough for
//! composable pools nested inside composable pools.

use crate::subgraph::SubgraphClient;
use crate::types::Pool;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// `totalShares > -1` matches every pool; it replaces the subgraph's
/// default low-liquidity exclusion and must stay in the filter
pub const TOTAL_SHARES_FLOOR: Decimal = Decimal::NEGATIVE_ONE;

/// Filter arguments for one pool lookup. Built fresh per call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub chain_id: u64,
    /// Lower-cased pool id
    pub id_eq: String,
    pub total_shares_gt: Decimal,
    pub pool_type_not_in: Vec<String>,
}

impl QueryArgs {
    pub fn for_pool(chain_id: u64, id: &str, excluded_pool_types: &[String]) -> Self {
        Self {
            chain_id,
            id_eq: id.trim().to_lowercase(),
            total_shares_gt: TOTAL_SHARES_FLOOR,
            pool_type_not_in: excluded_pool_types.to_vec(),
        }
    }

    /// Subgraph `Pool_filter` object
    pub fn to_subgraph_where(&self) -> Value {
        json!({
            "id": self.id_eq,
            "totalShares_gt": self.total_shares_gt.to_string(),
            "poolType_not_in": self.pool_type_not_in,
        })
    }
}

#[async_trait]
pub trait PoolRepository: Send + Sync {
    /// First pool matching `args`, or None
    async fn fetch(&self, args: &QueryArgs) -> Result<Option<Pool>>;
}

const POOL_TOKEN_FIELDS: &str = "address symbol decimals balance weight";

/// `pools(first: 1, where: $where)` with the token tree expanded
pub fn pool_query_document() -> String {
    let level3 = format!("tokens {{ {} }}", POOL_TOKEN_FIELDS);
    let level2 = format!(
        "tokens {{ {} token {{ pool {{ id address poolType {} }} }} }}",
        POOL_TOKEN_FIELDS, level3
    );
    let level1 = format!(
        "tokens {{ {} token {{ pool {{ id address poolType {} }} }} }}",
        POOL_TOKEN_FIELDS, level2
    );

    format!(
        "query Pool($where: Pool_filter) {{ pools(first: 1, where: $where) {{ \
         id address poolType owner swapFee totalShares totalLiquidity tokensList {} }} }}",
        level1
    )
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    pools: Vec<Pool>,
}

/// Balancer subgraph-backed repository
pub struct SubgraphPoolRepository {
    subgraph: SubgraphClient,
    chain_id: u64,
    document: String,
}

impl SubgraphPoolRepository {
    pub fn new(subgraph: SubgraphClient, chain_id: u64) -> Self {
        Self {
            subgraph,
            chain_id,
            document: pool_query_document(),
        }
    }
}

#[async_trait]
impl PoolRepository for SubgraphPoolRepository {
    async fn fetch(&self, args: &QueryArgs) -> Result<Option<Pool>> {
        if args.chain_id != self.chain_id {
            anyhow::bail!(
                "Query for chain {} sent to subgraph for chain {}",
                args.chain_id,
                self.chain_id
            );
        }

        debug!("Fetching pool {} from {}", args.id_eq, self.subgraph.url());
        let data: PoolsData = self
            .subgraph
            .query(&self.document, json!({ "where": args.to_subgraph_where() }))
            .await?;

        let pool = data.pools.into_iter().next();
        match &pool {
            Some(p) => info!("Fetched pool {} ({}, {} tokens)", p.id, p.pool_type, p.tokens.len()),
            None => debug!("Subgraph has no pool {}", args.id_eq),
        }
        Ok(pool)
    }
}
