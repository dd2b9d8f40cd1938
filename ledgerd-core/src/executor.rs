//! Query execution over the pool.
//!
//! One statement per call: acquire a connection, run the statement,
//! release the connection unconditionally. The release is carried by the
//! checkout guard, so it happens on every exit path including statement
//! errors. Failed statements are reported once, never retried.

use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;

use crate::error::{DbError, PoolError};
use crate::factory::MySqlFactory;
use crate::pool::{Pool, PoolConfig, PoolStatus};
use crate::secrets::Credentials;

/// Handle to the pooled database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: Pool<MySqlFactory>,
}

impl Database {
    /// Build an uninitialized handle. Every query fails with
    /// [`PoolError::NotInitialized`] until [`Database::initialize`] runs.
    pub fn new(credentials: &Credentials, config: PoolConfig) -> Result<Self, PoolError> {
        let factory = MySqlFactory::new(credentials);
        Ok(Self {
            pool: Pool::new(factory, config)?,
        })
    }

    /// Bring the pool to Ready.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        self.pool.initialize().await
    }

    /// Build the pool from resolved credentials and bring it to Ready.
    ///
    /// Errors here are unrecoverable startup failures; the caller is
    /// expected to terminate rather than serve without a database.
    pub async fn connect(credentials: &Credentials, config: PoolConfig) -> Result<Self, PoolError> {
        let db = Self::new(credentials, config)?;
        db.initialize().await?;
        Ok(db)
    }

    /// Run a statement and return its rows.
    ///
    /// Acquisition failures are returned without running the statement.
    pub async fn fetch_all(
        &self,
        query: Query<'_, MySql, MySqlArguments>,
    ) -> Result<Vec<MySqlRow>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let rows = query.fetch_all(&mut *conn).await?;
        Ok(rows)
    }

    /// Run a statement and return the affected-row count.
    pub async fn execute(&self, query: Query<'_, MySql, MySqlArguments>) -> Result<u64, DbError> {
        let mut conn = self.pool.acquire().await?;
        let result = query.execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// Snapshot of the underlying pool, for health and metrics.
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Drain and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
