//! Query keys
//!
//! All keys are built here so the pool query and the gauge query can't drift.

use alloy::primitives::Address;
use std::fmt;

/// Composite cache key: scope, entity and ordered arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub scope: &'static str,
    pub entity: &'static str,
    pub args: Vec<String>,
}

impl QueryKey {
    pub fn new(scope: &'static str, entity: &'static str, args: Vec<String>) -> Self {
        Self { scope, entity, args }
    }

    /// Current pool: `(pool id, gauge addresses)`. The id is kept as given;
    /// gauge order is preserved so a reordered list is a different key.
    pub fn pool_current(id: &str, gauge_addresses: &[Address]) -> Self {
        let mut args = Vec::with_capacity(gauge_addresses.len() + 1);
        args.push(id.to_string());
        args.extend(gauge_addresses.iter().map(|a| format!("{:?}", a)));
        Self::new("pools", "current", args)
    }

    /// All live gauges
    pub fn gauges_all() -> Self {
        Self::new("gauges", "all", Vec::new())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}({})", self.scope, self.entity, self.args.join(","))
    }
}
