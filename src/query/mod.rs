//! Reactive query layer
//!
//! Minimal stand-in for a reactive query library: keyed cache entries,
//! an enabled gate, retry with backoff, stale time and refetch interval.
//! Dependencies are `tokio::sync::watch` cells; derived cells recompute when
//! their inputs change.

pub mod client;
pub mod key;
pub mod observer;
pub mod reactive;

pub use client::{QueryClient, QueryFn, QueryOptions, QueryState, QueryStatus};
pub use key::QueryKey;
pub use observer::{use_query, UseQuery};
