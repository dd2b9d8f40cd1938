//! Schema bootstrap, run once at startup before the listener binds.

use ledgerd_core::{Database, DbError};

const CREATE_TRANSACTIONS: &str = "\
CREATE TABLE IF NOT EXISTS transactions (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    amount DOUBLE NOT NULL,
    description VARCHAR(255) NOT NULL
)";

/// Ensure the transactions table exists. Idempotent.
pub async fn run(db: &Database) -> Result<(), DbError> {
    db.execute(sqlx::query(CREATE_TRANSACTIONS)).await?;
    tracing::debug!("transactions schema ensured");
    Ok(())
}
