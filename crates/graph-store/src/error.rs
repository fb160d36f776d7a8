//! C1's error boundary (§4.1 "Failure semantics", §7).

use retrieval_types::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphStoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("transient backend error: {0}")]
    Transient(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl GraphStoreError {
    /// Retry-safe per §4.1/§5: only `Transient` failures are worth
    /// retrying with backoff; `NotFound`/`ConstraintViolation` are not.
    /// A `Database` error is only transient if it's a connection/pool-level
    /// failure rather than e.g. a constraint violation surfaced by the
    /// driver.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            #[cfg(feature = "database")]
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

impl From<GraphStoreError> for EngineError {
    fn from(err: GraphStoreError) -> Self {
        match err {
            GraphStoreError::NotFound(m) => EngineError::NotFound(m),
            GraphStoreError::ConstraintViolation(m) => EngineError::ConstraintViolation(m),
            GraphStoreError::Transient(m) => EngineError::TransientBackendError(m),
            #[cfg(feature = "database")]
            GraphStoreError::Database(e) => EngineError::TransientBackendError(e.to_string()),
        }
    }
}

pub type GraphStoreResult<T> = Result<T, GraphStoreError>;
