//! OpenAPI document, derived from the route annotations and served as JSON.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::repo::Transaction;
use crate::routes;
use crate::routes::health::{DatabaseHealth, HealthResponse};
use crate::routes::transactions::{CreateTransactionRequest, MessageResponse, TransactionList};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ledgerd",
        description = "App-tier HTTP service for the transactions ledger"
    ),
    paths(
        routes::health::health_check,
        routes::metrics::metrics,
        routes::transactions::add_transaction,
        routes::transactions::list_transactions,
        routes::transactions::get_transaction,
        routes::transactions::delete_all_transactions,
        routes::transactions::delete_transaction,
    ),
    components(schemas(
        Transaction,
        TransactionList,
        CreateTransactionRequest,
        MessageResponse,
        HealthResponse,
        DatabaseHealth,
    ))
)]
pub struct ApiDoc;

/// GET /api-docs - the OpenAPI document
pub(crate) async fn serve_doc() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Documentation routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api-docs", get(serve_doc))
}
