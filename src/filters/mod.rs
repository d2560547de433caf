//! Pool filtering system
//!
//! Access control for the pool query: allow lists for pool types that need
//! them plus a global block list. Loaded from config/pool_access.json.

pub mod access;

pub use access::{AccessFilter, AllowListFilter, PoolAccessConfig};
