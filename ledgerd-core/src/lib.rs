//! ledgerd-core: credential resolution, connection pooling, and query
//! execution for the transactions service.
//!
//! Startup ordering is strict: credentials resolve once from the secret
//! store, the pool initializes with a factory bound to those credentials,
//! and only then does query execution become available. Calls against the
//! pool before it reaches Ready fail fast with
//! [`PoolError::NotInitialized`].

pub mod error;
pub mod executor;
pub mod factory;
pub mod pool;
pub mod secrets;

pub use error::{DbError, PoolError, SecretError};
pub use executor::Database;
pub use factory::{ConnectionFactory, MySqlFactory};
pub use pool::{Pool, PoolConfig, PoolState, PoolStatus, PooledConnection};
pub use secrets::{AwsSecretSource, Credentials, SecretProvider, SecretSource};
