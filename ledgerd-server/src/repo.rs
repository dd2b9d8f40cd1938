//! Transaction repository
//!
//! Builds the five SQL statements for the `transactions` table and drives
//! them through the query executor. Caller-supplied values are always
//! bound as parameters, never interpolated into the statement text.

use ledgerd_core::{Database, DbError};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Transaction record from the database
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Transaction {
    pub id: i64,
    pub amount: f64,
    pub description: String,
}

/// Transaction repository
pub struct TransactionRepo<'a> {
    db: &'a Database,
}

impl<'a> TransactionRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert one row. The generated id is not returned.
    pub async fn add(&self, amount: f64, description: &str) -> Result<(), DbError> {
        self.db
            .execute(
                sqlx::query("INSERT INTO transactions (amount, description) VALUES (?, ?)")
                    .bind(amount)
                    .bind(description),
            )
            .await?;
        Ok(())
    }

    /// All rows.
    pub async fn list(&self) -> Result<Vec<Transaction>, DbError> {
        let rows = self
            .db
            .fetch_all(sqlx::query("SELECT id, amount, description FROM transactions"))
            .await?;
        rows.iter()
            .map(|row| Transaction::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Rows matching `id`. Zero rows is a valid empty result, not an error.
    pub async fn find_by_id(&self, id: i64) -> Result<Vec<Transaction>, DbError> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query("SELECT id, amount, description FROM transactions WHERE id = ?")
                    .bind(id),
            )
            .await?;
        rows.iter()
            .map(|row| Transaction::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Remove all rows, returning how many were deleted.
    pub async fn delete_all(&self) -> Result<u64, DbError> {
        self.db
            .execute(sqlx::query("DELETE FROM transactions"))
            .await
    }

    /// Remove the matching row(s), returning how many were deleted.
    pub async fn delete_by_id(&self, id: i64) -> Result<u64, DbError> {
        self.db
            .execute(sqlx::query("DELETE FROM transactions WHERE id = ?").bind(id))
            .await
    }
}
