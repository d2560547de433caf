//! Current pool query
//!
//! Resolves one pool by id: store lookup, remote fetch on a miss, access
//! check, on-chain decoration when `onchain` is missing and registration of
//! every referenced token. `use_pool_query` wraps that in the query layer,
//! keyed by `(pool id, gauge addresses)` and gated on
//! `is_enabled && !registry.loading`.
//!
//! Created: 2026-10-19

use crate::config::AppConfig;
use crate::error::PoolQueryError;
use crate::filters::AccessFilter;
use crate::pool::{PoolDecorator, PoolRepository, PoolStore, QueryArgs};
use crate::query::{reactive, use_query, QueryClient, QueryFn, QueryKey, QueryOptions, UseQuery};
use crate::tokens::TokenRegistry;
use crate::types::Pool;
use alloy::primitives::Address;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct PoolQuery {
    chain_id: u64,
    excluded_pool_types: Vec<String>,
    store: PoolStore,
    registry: Arc<TokenRegistry>,
    repository: Arc<dyn PoolRepository>,
    decorator: Arc<dyn PoolDecorator>,
    access: Arc<dyn AccessFilter>,
    gauge_addresses: watch::Receiver<Vec<Address>>,
    account: watch::Receiver<Option<Address>>,
    client: Arc<QueryClient<Pool, PoolQueryError>>,
}

impl PoolQuery {
    /// No gauges and no connected account until set with the `with_*`
    /// builders
    pub fn new(
        config: &AppConfig,
        store: PoolStore,
        registry: Arc<TokenRegistry>,
        repository: Arc<dyn PoolRepository>,
        decorator: Arc<dyn PoolDecorator>,
        access: Arc<dyn AccessFilter>,
    ) -> Self {
        let (_, gauge_addresses) = watch::channel(Vec::new());
        let (_, account) = watch::channel(None);

        Self {
            chain_id: config.network.chain_id,
            excluded_pool_types: config.pools.excluded_pool_types.clone(),
            store,
            registry,
            repository,
            decorator,
            access,
            gauge_addresses,
            account,
            client: Arc::new(QueryClient::new()),
        }
    }

    pub fn with_gauge_addresses(mut self, gauge_addresses: watch::Receiver<Vec<Address>>) -> Self {
        self.gauge_addresses = gauge_addresses;
        self
    }

    pub fn with_account(mut self, account: watch::Receiver<Option<Address>>) -> Self {
        self.account = account;
        self
    }

    /// Cache shared by every `use_pool_query` handle
    pub fn client(&self) -> &Arc<QueryClient<Pool, PoolQueryError>> {
        &self.client
    }

    pub fn query_args(&self, id: &str) -> QueryArgs {
        QueryArgs::for_pool(self.chain_id, id, &self.excluded_pool_types)
    }

    /// One full resolution. Steps run strictly in order and any collaborator
    /// failure aborts the whole execution.
    pub async fn fetch_pool(&self, id: &str) -> Result<Pool, PoolQueryError> {
        let pool = match self.store.find_pool(id) {
            Some(pool) => {
                debug!("Pool {} found in store", id);
                pool
            }
            None => {
                let args = self.query_args(id);
                self.repository
                    .fetch(&args)
                    .await?
                    .ok_or_else(|| PoolQueryError::NotFound(id.to_string()))?
            }
        };

        let account = *self.account.borrow();
        if self.access.is_blocked(&pool, account) {
            info!("Pool {} not allowed for account {:?}", id, account);
            return Err(PoolQueryError::NotAllowed(id.to_string()));
        }

        let pool = if pool.is_decorated() {
            pool
        } else {
            let tokens = self.registry.tokens();
            self.decorator
                .decorate(vec![pool], &tokens, false)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Decorator returned no pool for {}", id))?
        };

        let addresses = pool.referenced_token_addresses();
        self.registry.inject_tokens(&addresses).await?;

        debug!("Pool {} resolved ({} token addresses)", pool.id, addresses.len());
        Ok(pool)
    }

    /// Reactive handle for pool `id`. `options` never carries an enabled
    /// flag; the gate is always `is_enabled && !registry.loading`. Must be
    /// called inside a tokio runtime.
    pub fn use_pool_query(
        self: &Arc<Self>,
        id: &str,
        is_enabled: watch::Receiver<bool>,
        options: QueryOptions,
    ) -> UseQuery<Pool, PoolQueryError> {
        let key_id = id.to_string();
        let key = reactive::map(self.gauge_addresses.clone(), move |gauges: &Vec<Address>| {
            QueryKey::pool_current(&key_id, gauges)
        });

        let enabled = reactive::combine(
            is_enabled,
            self.registry.loading(),
            |enabled: &bool, loading: &bool| *enabled && !*loading,
        );

        let this = Arc::clone(self);
        let pool_id = id.to_string();
        let query_fn: QueryFn<Pool, PoolQueryError> = Arc::new(move |_key: QueryKey| {
            let this = Arc::clone(&this);
            let pool_id = pool_id.clone();
            async move { this.fetch_pool(&pool_id).await }.boxed()
        });

        use_query(Arc::clone(&self.client), key, enabled, options, query_fn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{AllowListFilter, PoolAccessConfig};
    use crate::gauges::GaugesQuery;
    use crate::test_support::{
        addr, decorated_pool, gauge, nested_token, raw_pool, MockAccess, MockDecorator,
        MockGaugeSource, MockRepository, MockTokenSource,
    };
    use crate::types::{PoolToken, PoolType};
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        store: PoolStore,
        repository: Arc<MockRepository>,
        decorator: Arc<MockDecorator>,
        tokens: Arc<MockTokenSource>,
        registry: Arc<TokenRegistry>,
        query: Arc<PoolQuery>,
    }

    fn harness(repository: MockRepository, blocked: bool) -> Harness {
        harness_with(repository, blocked, |query| query)
    }

    fn harness_with(
        repository: MockRepository,
        blocked: bool,
        configure: impl FnOnce(PoolQuery) -> PoolQuery,
    ) -> Harness {
        let config = AppConfig::for_chain("polygon").unwrap();
        let store = PoolStore::new();
        let repository = Arc::new(repository);
        let decorator = Arc::new(MockDecorator::default());
        let tokens = Arc::new(MockTokenSource::default());
        let registry = Arc::new(TokenRegistry::new(tokens.clone()));

        let query = PoolQuery::new(
            &config,
            store.clone(),
            registry.clone(),
            repository.clone(),
            decorator.clone(),
            Arc::new(MockAccess { blocked }),
        );

        Harness {
            store,
            repository,
            decorator,
            tokens,
            registry,
            query: Arc::new(configure(query)),
        }
    }

    fn options() -> QueryOptions {
        QueryOptions {
            retry: 0,
            ..QueryOptions::default()
        }
    }

    fn injected(h: &Harness) -> HashSet<Address> {
        h.tokens.requests().into_iter().flatten().collect()
    }

    #[tokio::test]
    async fn test_store_hit_skips_repository() {
        let h = harness(MockRepository::empty(), false);
        h.store.add_pool(decorated_pool("0xABC", 1));

        let pool = assert_ok!(h.query.fetch_pool("0xabc").await);

        assert_eq!(pool.id, "0xABC");
        assert_eq!(h.repository.calls(), 0);
        assert_eq!(h.decorator.calls(), 0);
    }

    #[tokio::test]
    async fn test_repository_receives_query_args() {
        let h = harness(MockRepository::returning(raw_pool("0xdef", 2)), false);

        assert_ok!(h.query.fetch_pool("0xDEF").await);

        let args = h.repository.last_args().unwrap();
        assert_eq!(args.chain_id, 137);
        assert_eq!(args.id_eq, "0xdef");
        assert_eq!(args.total_shares_gt, Decimal::NEGATIVE_ONE);
        assert!(args.pool_type_not_in.contains(&"Element".to_string()));
    }

    #[tokio::test]
    async fn test_not_found() {
        let h = harness(MockRepository::empty(), false);

        let err = assert_err!(h.query.fetch_pool("0xmissing").await);

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Pool does not exist: 0xmissing");
        assert_eq!(h.decorator.calls(), 0);
        assert!(h.tokens.requests().is_empty());
    }

    #[tokio::test]
    async fn test_not_allowed_from_store() {
        let h = harness(MockRepository::empty(), true);
        h.store.add_pool(decorated_pool("0xabc", 1));

        let err = assert_err!(h.query.fetch_pool("0xabc").await);

        assert!(err.is_not_allowed());
        assert_eq!(h.repository.calls(), 0);
        assert!(h.tokens.requests().is_empty());
    }

    #[tokio::test]
    async fn test_not_allowed_from_repository() {
        let h = harness(MockRepository::returning(raw_pool("0xdef", 2)), true);

        let err = assert_err!(h.query.fetch_pool("0xdef").await);

        assert!(err.is_not_allowed());
        assert_eq!(h.repository.calls(), 1);
        assert_eq!(h.decorator.calls(), 0);
    }

    #[tokio::test]
    async fn test_repository_failure_propagates() {
        let h = harness(MockRepository::failing(), false);

        let err = assert_err!(h.query.fetch_pool("0xdef").await);

        assert!(matches!(err, PoolQueryError::Collaborator(_)));
        assert_eq!(err.to_string(), "subgraph unavailable");
    }

    #[tokio::test]
    async fn test_undecorated_pool_decorated_once() {
        let h = harness(MockRepository::returning(raw_pool("0xdef", 2)), false);

        let pool = assert_ok!(h.query.fetch_pool("0xdef").await);

        assert!(pool.is_decorated());
        assert_eq!(h.decorator.calls(), 1);
        assert_eq!(h.decorator.force_refresh_seen(), vec![false]);
    }

    #[tokio::test]
    async fn test_stored_undecorated_pool_is_decorated() {
        let h = harness(MockRepository::empty(), false);
        h.store.add_pool(raw_pool("0xabc", 1));

        let pool = assert_ok!(h.query.fetch_pool("0xabc").await);

        assert!(pool.is_decorated());
        assert_eq!(h.decorator.calls(), 1);
        // The store is read-only here
        assert!(!h.store.find_pool("0xabc").unwrap().is_decorated());
    }

    #[tokio::test]
    async fn test_injects_nested_leaves_and_pool_address() {
        let mut pool = raw_pool("0xcomposable", 0x10);
        let bpt = addr(0x50);
        pool.tokens_list = vec![addr(0x10), bpt, pool.address];
        pool.tokens = vec![
            PoolToken::new(addr(0x10)),
            nested_token(
                bpt,
                vec![
                    PoolToken::new(addr(0x51)),
                    nested_token(addr(0x60), vec![PoolToken::new(addr(0x61)), PoolToken::new(addr(0x62))]),
                ],
            ),
            PoolToken::new(pool.address),
        ];
        let pool_address = pool.address;
        let h = harness(MockRepository::returning(pool), false);

        assert_ok!(h.query.fetch_pool("0xcomposable").await);

        let expected: HashSet<Address> = [
            addr(0x10),
            bpt,
            pool_address,
            addr(0x51),
            addr(0x61),
            addr(0x62),
        ]
        .into_iter()
        .collect();
        assert_eq!(injected(&h), expected);
        assert_eq!(h.tokens.requests().len(), 1);
        assert!(h.registry.contains(&addr(0x62)));
    }

    #[tokio::test]
    async fn test_injection_failure_propagates() {
        let config = AppConfig::for_chain("mainnet").unwrap();
        let registry = Arc::new(TokenRegistry::new(Arc::new(MockTokenSource::failing())));
        let query = PoolQuery::new(
            &config,
            PoolStore::new(),
            registry,
            Arc::new(MockRepository::returning(decorated_pool("0xdef", 2))),
            Arc::new(MockDecorator::default()),
            Arc::new(MockAccess { blocked: false }),
        );

        let err = assert_err!(query.fetch_pool("0xdef").await);
        assert!(matches!(err, PoolQueryError::Collaborator(_)));
    }

    // pool1: in store, decorated, no gauges
    #[tokio::test]
    async fn test_cached_decorated_pool_resolves_without_fetches() {
        let h = harness(MockRepository::empty(), false);
        let pool1 = decorated_pool("0xabc0000000000000000000000000000000000000000000000000000000pool1", 1);
        h.store.add_pool(pool1.clone());
        h.registry
            .inject_tokens(&pool1.referenced_token_addresses())
            .await
            .unwrap();
        let requests_before = h.tokens.requests().len();

        let (_enabled_tx, enabled) = watch::channel(true);
        let query = h.query.use_pool_query(&pool1.id, enabled, options());
        let state = query.settled().await.unwrap();

        assert_eq!(state.data, Some(pool1));
        assert_eq!(h.repository.calls(), 0);
        assert_eq!(h.decorator.calls(), 0);
        assert_eq!(h.tokens.requests().len(), requests_before);
    }

    // pool2: not in store, repository returns it undecorated
    #[tokio::test]
    async fn test_remote_pool_decorated_and_injected() {
        let pool2 = raw_pool("0xdef0000000000000000000000000000000000000000000000000000000pool2", 2);
        let h = harness(MockRepository::returning(pool2.clone()), false);

        let (_enabled_tx, enabled) = watch::channel(true);
        let query = h.query.use_pool_query(&pool2.id, enabled, options());
        let state = query.settled().await.unwrap();

        assert!(state.is_success());
        assert!(state.data.unwrap().is_decorated());
        assert_eq!(h.decorator.calls(), 1);
        assert_eq!(h.tokens.requests().len(), 1);
        let expected: HashSet<Address> = pool2.referenced_token_addresses().into_iter().collect();
        assert_eq!(injected(&h), expected);
    }

    #[tokio::test]
    async fn test_errors_surface_in_query_state() {
        let h = harness(MockRepository::empty(), false);

        let (_enabled_tx, enabled) = watch::channel(true);
        let query = h.query.use_pool_query("0xmissing", enabled, options());
        let state = query.settled().await.unwrap();

        assert!(state.is_error());
        assert!(state.error.unwrap().is_not_found());
        assert!(state.data.is_none());
    }

    #[tokio::test]
    async fn test_gauge_change_refetches_under_new_key() {
        let gauges = Arc::new(MockGaugeSource::default());
        gauges.set(vec![gauge(0x71, "0xdef")]);
        let gauges_query = GaugesQuery::new(gauges.clone(), options());
        let addresses = gauges_query.addresses();

        let h = harness_with(MockRepository::returning(raw_pool("0xdef", 2)), false, |query| {
            query.with_gauge_addresses(addresses)
        });

        let (_enabled_tx, enabled) = watch::channel(true);
        let query = h.query.use_pool_query("0xdef", enabled, options());

        let one_gauge = QueryKey::pool_current("0xdef", &[addr(0x71)]);
        tokio::time::timeout(Duration::from_secs(2), query.settled_for(&one_gauge))
            .await
            .unwrap()
            .unwrap();

        gauges.set(vec![gauge(0x71, "0xdef"), gauge(0x72, "0xdef")]);
        gauges_query.refetch();

        let two_gauges = QueryKey::pool_current("0xdef", &[addr(0x71), addr(0x72)]);
        let state = tokio::time::timeout(Duration::from_secs(2), query.settled_for(&two_gauges))
            .await
            .unwrap()
            .unwrap();

        assert!(state.is_success());
        assert_eq!(h.query.client().execution_count(&two_gauges), 1);
        assert!(h.query.client().get_data(&one_gauge).is_some());
        assert!(h.repository.calls() >= 2);
    }

    #[tokio::test]
    async fn test_gate_closed_while_registry_loading() {
        let h = harness(MockRepository::returning(raw_pool("0xdef", 2)), false);
        let load = h.registry.begin_dynamic_load();

        let (_enabled_tx, enabled) = watch::channel(true);
        let query = h.query.use_pool_query("0xdef", enabled, options());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.repository.calls(), 0);
        assert!(query.data().is_none());

        drop(load);
        let state = tokio::time::timeout(Duration::from_secs(2), query.settled())
            .await
            .unwrap()
            .unwrap();
        assert!(state.is_success());
        assert_eq!(h.repository.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_query_never_runs() {
        let h = harness(MockRepository::returning(raw_pool("0xdef", 2)), false);

        let (enabled_tx, enabled) = watch::channel(false);
        let query = h.query.use_pool_query("0xdef", enabled, options());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.repository.calls(), 0);
        assert!(!query.is_loading());

        enabled_tx.send(true).unwrap();
        let state = tokio::time::timeout(Duration::from_secs(2), query.settled())
            .await
            .unwrap()
            .unwrap();
        assert!(state.is_success());
    }

    #[tokio::test]
    async fn test_account_change_applies_on_next_run() {
        let config = AppConfig::for_chain("mainnet").unwrap();
        let access: PoolAccessConfig = serde_json::from_str(r#"{"version": "1.0"}"#).unwrap();
        let mut managed = decorated_pool("0xmanaged", 3);
        managed.pool_type = PoolType::Managed;
        managed.owner = Some(addr(0x42));

        let (account_tx, account) = watch::channel(None);
        let query = PoolQuery::new(
            &config,
            PoolStore::new(),
            Arc::new(TokenRegistry::new(Arc::new(MockTokenSource::default()))),
            Arc::new(MockRepository::returning(managed)),
            Arc::new(MockDecorator::default()),
            Arc::new(AllowListFilter::from_config(access)),
        )
        .with_account(account);

        let err = assert_err!(query.fetch_pool("0xmanaged").await);
        assert!(err.is_not_allowed());

        account_tx.send(Some(addr(0x42))).unwrap();
        assert_ok!(query.fetch_pool("0xmanaged").await);
    }
}
