//! Balancer current-pool query
//!
//! Resolves a single pool by id from the local store, the Balancer subgraph
//! and on-chain reads, registers its tokens and exposes the result as a
//! cached, reactive query.
//!
//! Created: 2026-10-19

pub mod config;
pub mod contracts;
pub mod error;
pub mod filters;
pub mod gauges;
pub mod pool;
pub mod pool_query;
pub mod query;
pub mod subgraph;
pub mod tokens;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{load_config, AppConfig};
pub use error::PoolQueryError;
pub use pool::PoolStore;
pub use pool_query::PoolQuery;
pub use query::{QueryOptions, QueryState, UseQuery};
pub use tokens::TokenRegistry;
pub use types::{Pool, PoolType, TokenInfo};
