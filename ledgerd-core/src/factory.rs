//! Connection creation, validation, and teardown.
//!
//! The pool talks to the database only through [`ConnectionFactory`], so
//! pool behavior can be tested against an in-memory factory.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;

use crate::error::PoolError;
use crate::secrets::Credentials;

/// Bound on connect and ping round trips.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens, validates, and closes a single database connection.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection. Suspends until the handshake completes.
    async fn create(&self) -> Result<Self::Connection, PoolError>;

    /// Close a connection. Best-effort: close errors are logged and
    /// absorbed, never surfaced to the caller.
    async fn destroy(&self, conn: Self::Connection);

    /// Liveness probe. Returns false on any error. Bounded by the same
    /// network timeout as the other operations.
    async fn validate(&self, conn: &mut Self::Connection) -> bool;
}

#[async_trait]
impl<F: ConnectionFactory + ?Sized> ConnectionFactory for std::sync::Arc<F> {
    type Connection = F::Connection;

    async fn create(&self) -> Result<Self::Connection, PoolError> {
        (**self).create().await
    }

    async fn destroy(&self, conn: Self::Connection) {
        (**self).destroy(conn).await;
    }

    async fn validate(&self, conn: &mut Self::Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Factory for MySQL connections bound to resolved credentials.
pub struct MySqlFactory {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlFactory {
    pub fn new(credentials: &Credentials) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&credentials.host)
            .username(&credentials.username)
            .password(credentials.password())
            .database(&credentials.database);

        Self {
            options,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl ConnectionFactory for MySqlFactory {
    type Connection = MySqlConnection;

    async fn create(&self) -> Result<MySqlConnection, PoolError> {
        let conn = tokio::time::timeout(
            self.connect_timeout,
            MySqlConnection::connect_with(&self.options),
        )
        .await
        .map_err(|_| PoolError::Connection("connect timed out".into()))?
        .map_err(|err| PoolError::Connection(err.to_string()))?;

        tracing::debug!("new connection created in pool");
        Ok(conn)
    }

    async fn destroy(&self, conn: MySqlConnection) {
        if let Err(err) = conn.close().await {
            tracing::warn!(error = %err, "error closing connection");
        } else {
            tracing::debug!("connection destroyed");
        }
    }

    async fn validate(&self, conn: &mut MySqlConnection) -> bool {
        matches!(
            tokio::time::timeout(self.connect_timeout, conn.ping()).await,
            Ok(Ok(()))
        )
    }
}
