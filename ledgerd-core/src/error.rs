/// Structured error types for ledgerd-core.
///
/// Uses `thiserror` for better API surface and error composition.
/// The binary crate (ledgerd-cli) can still use `anyhow` for convenience,
/// but library consumers get structured, composable errors.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving database credentials from the secret store.
#[derive(Error, Debug)]
pub enum SecretError {
    /// The secret store could not be reached or refused the request
    #[error("secret store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The payload did not parse as the expected credential structure
    #[error("malformed secret payload: {reason}")]
    Malformed { reason: String },
}

impl SecretError {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a malformed-payload error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool has not reached the Ready state yet
    #[error("pool is not initialized")]
    NotInitialized,

    /// The pool is shutting down or closed
    #[error("pool is closed")]
    Closed,

    /// No connection could be checked out within the timeout
    #[error("connection acquire timed out after {0:?}")]
    AcquireTimeout(Duration),

    /// Opening a new database connection failed
    #[error("failed to create connection: {0}")]
    Connection(String),

    /// The pool was configured with inconsistent limits
    #[error("pool configuration error: {0}")]
    Config(String),
}

/// Errors surfaced to the repository layer by the query executor.
#[derive(Error, Debug)]
pub enum DbError {
    /// Checkout failed; the statement was never run
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The statement ran and the database reported an error
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}
