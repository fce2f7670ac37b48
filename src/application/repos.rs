//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::statement::QueryStatement;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Runs a built statement against storage and returns the matching records.
#[async_trait]
pub trait StatementExecutor<R>: Send + Sync {
    async fn execute(&self, statement: &QueryStatement) -> Result<Vec<R>, RepoError>;
}
