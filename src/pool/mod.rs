//! Pool data sources
//!
//! Local store of already-loaded pools, the remote repository and the
//! on-chain decorator.

pub mod decorator;
pub mod repository;
pub mod store;

pub use decorator::{OnchainPoolDecorator, PoolDecorator};
pub use repository::{PoolRepository, QueryArgs, SubgraphPoolRepository};
pub use store::PoolStore;
