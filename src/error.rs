//! Pool query errors
//!
//! NotFound and NotAllowed are raised by the orchestration itself; everything
//! a collaborator returns is passed through untouched.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolQueryError {
    #[error("Pool does not exist: {0}")]
    NotFound(String),

    #[error("Pool not allowed: {0}")]
    NotAllowed(String),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl PoolQueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PoolQueryError::NotFound(_))
    }

    pub fn is_not_allowed(&self) -> bool {
        matches!(self, PoolQueryError::NotAllowed(_))
    }
}
