//! Liquidity gauges
//!
//! The live gauge list is fetched once through the query layer and exposed
//! as a derived cell of gauge addresses. The pool query folds that list into
//! its key, so a changed gauge set re-resolves the pool.

use crate::query::{reactive, use_query, QueryClient, QueryFn, QueryKey, QueryOptions, QueryState, UseQuery};
use crate::subgraph::SubgraphClient;
use crate::types::Gauge;
use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[async_trait]
pub trait GaugeSource: Send + Sync {
    async fn fetch_gauges(&self) -> Result<Vec<Gauge>>;
}

/// Subgraph cap on `first`
const GAUGE_PAGE_SIZE: usize = 1000;

/// Pages are ordered by id and continue after the last id seen
const GAUGES_QUERY: &str = "query Gauges($first: Int!, $lastId: ID!) { \
    liquidityGauges(first: $first, orderBy: id, orderDirection: asc, \
    where: { isKilled: false, id_gt: $lastId }) { id poolId poolAddress isKilled } }";

#[derive(Debug, Deserialize)]
struct GaugesData {
    #[serde(rename = "liquidityGauges")]
    liquidity_gauges: Vec<Gauge>,
}

/// Gauges subgraph
pub struct SubgraphGaugeSource {
    subgraph: SubgraphClient,
}

impl SubgraphGaugeSource {
    pub fn new(subgraph: SubgraphClient) -> Self {
        Self { subgraph }
    }
}

#[async_trait]
impl GaugeSource for SubgraphGaugeSource {
    async fn fetch_gauges(&self) -> Result<Vec<Gauge>> {
        let gauges = collect_pages(GAUGE_PAGE_SIZE, |last_id| async move {
            let variables = json!({ "first": GAUGE_PAGE_SIZE, "lastId": last_id });
            let data: GaugesData = self.subgraph.query(GAUGES_QUERY, variables).await?;
            Ok::<_, anyhow::Error>(data.liquidity_gauges)
        })
        .await?;
        info!("Loaded {} live gauge(s)", gauges.len());
        Ok(gauges)
    }
}

/// Keep requesting pages after the last gauge id until one comes back
/// short. The first request uses an empty cursor.
async fn collect_pages<F, Fut>(page_size: usize, mut fetch_page: F) -> Result<Vec<Gauge>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<Gauge>>>,
{
    let mut gauges = Vec::new();
    let mut last_id = String::new();
    loop {
        let page = fetch_page(last_id.clone()).await?;
        debug!("Gauge page after {:?}: {} row(s)", last_id, page.len());

        let next = if page.len() >= page_size {
            page.last().map(|g| format!("{:#x}", g.id))
        } else {
            None
        };
        gauges.extend(page);

        match next {
            Some(id) => last_id = id,
            None => return Ok(gauges),
        }
    }
}

/// Cached gauge list plus the derived address cell
pub struct GaugesQuery {
    query: UseQuery<Vec<Gauge>, anyhow::Error>,
    addresses: watch::Receiver<Vec<Address>>,
}

impl GaugesQuery {
    /// Start fetching. Must be called inside a tokio runtime.
    pub fn new(source: Arc<dyn GaugeSource>, options: QueryOptions) -> Self {
        let client = Arc::new(QueryClient::new());
        let (_, key) = watch::channel(QueryKey::gauges_all());
        let (_, enabled) = watch::channel(true);

        let query_fn: QueryFn<Vec<Gauge>, anyhow::Error> = Arc::new(move |_key: QueryKey| {
            let source = Arc::clone(&source);
            async move { source.fetch_gauges().await }.boxed()
        });

        let query = use_query(client, key, enabled, options, query_fn);
        let addresses = reactive::map(query.subscribe(), gauge_addresses);

        Self { query, addresses }
    }

    /// Addresses of the loaded gauges; empty until the first fetch succeeds
    pub fn addresses(&self) -> watch::Receiver<Vec<Address>> {
        self.addresses.clone()
    }

    pub fn state(&self) -> QueryState<Vec<Gauge>, anyhow::Error> {
        self.query.state()
    }

    pub fn refetch(&self) {
        self.query.refetch();
    }

    pub async fn settled(&self) -> Result<QueryState<Vec<Gauge>, anyhow::Error>> {
        self.query.settled().await
    }
}

fn gauge_addresses(state: &QueryState<Vec<Gauge>, anyhow::Error>) -> Vec<Address> {
    state
        .data
        .as_ref()
        .map(|gauges| gauges.iter().map(|g| g.id).collect())
        .unwrap_or_default()
}
