//! Transaction CRUD endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::repo::{Transaction, TransactionRepo};
use crate::state::AppState;

/// Create transaction request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    /// Transaction amount
    #[schema(example = 100.50)]
    pub amount: f64,
    /// Transaction description
    #[serde(alias = "desc")]
    #[schema(example = "Payment for services")]
    pub description: String,
}

/// Confirmation message response
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// List response wrapping all transactions
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionList {
    pub result: Vec<Transaction>,
}

/// POST /transaction - add a new transaction
#[utoipa::path(
    post,
    path = "/transaction",
    tag = "Transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 200, description = "Transaction added successfully", body = MessageResponse),
        (status = 503, description = "Database pool not ready or exhausted"),
    )
)]
pub(crate) async fn add_transaction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    TransactionRepo::new(&state.db)
        .add(req.amount, &req.description)
        .await?;
    Ok(Json(MessageResponse {
        message: "added transaction successfully".into(),
    }))
}

/// GET /transaction - list all transactions
#[utoipa::path(
    get,
    path = "/transaction",
    tag = "Transactions",
    responses(
        (status = 200, description = "List of all transactions", body = TransactionList),
        (status = 503, description = "Database pool not ready or exhausted"),
    )
)]
pub(crate) async fn list_transactions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TransactionList>, ApiError> {
    let result = TransactionRepo::new(&state.db).list().await?;
    Ok(Json(TransactionList { result }))
}

/// GET /transaction/{id} - get a transaction by id
#[utoipa::path(
    get,
    path = "/transaction/{id}",
    tag = "Transactions",
    params(("id" = i64, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction details", body = Transaction),
        (status = 404, description = "No transaction with that id"),
    )
)]
pub(crate) async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>, ApiError> {
    let mut rows = TransactionRepo::new(&state.db).find_by_id(id).await?;
    match rows.pop() {
        Some(transaction) => Ok(Json(transaction)),
        None => Err(ApiError::NotFound {
            resource: "transaction",
            id: id.to_string(),
        }),
    }
}

/// DELETE /transaction - delete all transactions
#[utoipa::path(
    delete,
    path = "/transaction",
    tag = "Transactions",
    responses(
        (status = 200, description = "All transactions deleted", body = MessageResponse),
        (status = 503, description = "Database pool not ready or exhausted"),
    )
)]
pub(crate) async fn delete_all_transactions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = TransactionRepo::new(&state.db).delete_all().await?;
    Ok(Json(MessageResponse {
        message: format!("deleted {} transactions", deleted),
    }))
}

/// DELETE /transaction/{id} - delete a transaction by id
#[utoipa::path(
    delete,
    path = "/transaction/{id}",
    tag = "Transactions",
    params(("id" = i64, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction deleted", body = MessageResponse),
        (status = 404, description = "No transaction with that id"),
    )
)]
pub(crate) async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = TransactionRepo::new(&state.db).delete_by_id(id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound {
            resource: "transaction",
            id: id.to_string(),
        });
    }
    Ok(Json(MessageResponse {
        message: format!("transaction with id {} deleted", id),
    }))
}

/// Transaction routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/transaction",
            get(list_transactions)
                .post(add_transaction)
                .delete(delete_all_transactions),
        )
        .route(
            "/transaction/{id}",
            get(get_transaction).delete(delete_transaction),
        )
}
