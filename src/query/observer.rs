//! Query observer
//!
//! `use_query` spawns a driver task that watches the key and enabled cells,
//! starts executions when a trigger fires, and publishes the state of the
//! current key. Executions are never cancelled: a result for a key that is
//! no longer current lands in its own cache entry and is not published.

use super::client::{QueryClient, QueryFn, QueryOptions, QueryState};
use super::key::QueryKey;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

/// Why the driver woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// First evaluation
    Mount,
    /// Key changed or the gate opened: fetch if stale
    Dependency,
    /// Interval or manual refetch: fetch regardless of staleness
    Force,
    /// Nothing to fetch, just republish
    None,
}

/// Handle to a running query. Dropping it stops the driver.
pub struct UseQuery<T, E> {
    client: Arc<QueryClient<T, E>>,
    state: watch::Receiver<QueryState<T, E>>,
    refetch: mpsc::UnboundedSender<()>,
    driver: JoinHandle<()>,
}

impl<T, E> UseQuery<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    /// Current snapshot
    pub fn state(&self) -> QueryState<T, E> {
        self.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn is_error(&self) -> bool {
        self.state.borrow().is_error()
    }

    pub fn error(&self) -> Option<Arc<E>> {
        self.state.borrow().error.clone()
    }

    /// Receiver notified on every published state
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T, E>> {
        self.state.clone()
    }

    /// Wait for the next published state
    pub async fn changed(&mut self) -> Result<QueryState<T, E>> {
        self.state.changed().await.context("Query driver stopped")?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Refetch the current key regardless of staleness
    pub fn refetch(&self) {
        let _ = self.refetch.send(());
    }

    pub fn client(&self) -> &Arc<QueryClient<T, E>> {
        &self.client
    }

    /// Wait until a published state satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> Result<QueryState<T, E>>
    where
        F: FnMut(&QueryState<T, E>) -> bool,
    {
        let mut rx = self.state.clone();
        let state = rx.wait_for(predicate).await.context("Query driver stopped")?;
        Ok(state.clone())
    }

    /// Wait for the current key to finish (success or error)
    pub async fn settled(&self) -> Result<QueryState<T, E>> {
        self.wait_for(|state| state.is_settled()).await
    }

    /// Wait for `key` to finish
    pub async fn settled_for(&self, key: &QueryKey) -> Result<QueryState<T, E>> {
        self.wait_for(|state| state.is_settled() && state.key.as_ref() == Some(key))
            .await
    }
}

impl<T, E> Drop for UseQuery<T, E> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Observe `key` through `client`, running `query_fn` whenever the key
/// changes, the gate opens, the refetch interval elapses or `refetch()` is
/// called, and `enabled` is true. Must be called inside a tokio runtime.
pub fn use_query<T, E>(
    client: Arc<QueryClient<T, E>>,
    key: watch::Receiver<QueryKey>,
    enabled: watch::Receiver<bool>,
    options: QueryOptions,
    query_fn: QueryFn<T, E>,
) -> UseQuery<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    let initial = client.state(&key.borrow(), false);
    let (state_tx, state_rx) = watch::channel(initial);
    let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();

    let driver = tokio::spawn(drive(
        Arc::clone(&client),
        key,
        enabled,
        options,
        query_fn,
        state_tx,
        refetch_rx,
    ));

    UseQuery {
        client,
        state: state_rx,
        refetch: refetch_tx,
        driver,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn drive<T, E>(
    client: Arc<QueryClient<T, E>>,
    mut key: watch::Receiver<QueryKey>,
    mut enabled: watch::Receiver<bool>,
    options: QueryOptions,
    query_fn: QueryFn<T, E>,
    state_tx: watch::Sender<QueryState<T, E>>,
    mut refetch_rx: mpsc::UnboundedReceiver<()>,
) where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<QueryKey>();
    let mut in_flight: HashSet<QueryKey> = HashSet::new();
    let mut ticker = options.refetch_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    let mut key_open = true;
    let mut enabled_open = true;
    let mut current = key.borrow_and_update().clone();
    let mut is_enabled = *enabled.borrow_and_update();
    let mut trigger = Trigger::Mount;

    loop {
        let wants_fetch = match trigger {
            Trigger::Force => true,
            Trigger::Mount | Trigger::Dependency => client.is_stale(&current, options.stale_time),
            Trigger::None => false,
        };

        if is_enabled && wants_fetch && !in_flight.contains(&current) {
            in_flight.insert(current.clone());

            let client = Arc::clone(&client);
            let options = options.clone();
            let query_fn = Arc::clone(&query_fn);
            let done_tx = done_tx.clone();
            let run_key = current.clone();
            tokio::spawn(async move {
                client.execute(run_key.clone(), &options, &query_fn).await;
                let _ = done_tx.send(run_key);
            });
        }

        state_tx.send_replace(client.state(&current, in_flight.contains(&current)));

        trigger = tokio::select! {
            changed = key.changed(), if key_open => match changed {
                Ok(()) => {
                    let next = key.borrow_and_update().clone();
                    if next != current {
                        debug!("Query key changed: {} -> {}", current, next);
                        current = next;
                        Trigger::Dependency
                    } else {
                        Trigger::None
                    }
                }
                Err(_) => {
                    key_open = false;
                    Trigger::None
                }
            },
            changed = enabled.changed(), if enabled_open => match changed {
                Ok(()) => {
                    let next = *enabled.borrow_and_update();
                    let opened = next && !is_enabled;
                    is_enabled = next;
                    if opened {
                        Trigger::Dependency
                    } else {
                        Trigger::None
                    }
                }
                Err(_) => {
                    enabled_open = false;
                    Trigger::None
                }
            },
            Some(done) = done_rx.recv() => {
                in_flight.remove(&done);
                Trigger::None
            }
            _ = tick(&mut ticker), if ticker.is_some() => Trigger::Force,
            Some(()) = refetch_rx.recv() => Trigger::Force,
        };
    }
}
