//! Route handlers for the transaction API.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use crate::{
    Error, Inventory,
    audit::CompletenessSnapshot,
    database_id::{AccountId, ProjectId, TransactionId},
    item::{Item, ItemRequest},
    transaction::{Transaction, TransactionEdit, TransactionType},
};

/// The request body for creating a transaction.
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    /// The ID for the new transaction, chosen by the client.
    pub id: TransactionId,
    /// The project the transaction belongs to.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// Defaults to a purchase.
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of the transaction.
    #[serde(default)]
    pub description: String,
    /// The total paid, including tax.
    pub amount: Decimal,
    /// The pre-tax subtotal.
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    /// The tax rate as a percentage.
    #[serde(default)]
    pub tax_rate_pct: Option<Decimal>,
    /// The total amount of tax paid.
    #[serde(default)]
    pub tax_total: Option<Decimal>,
}

/// A route handler for creating a new transaction.
pub async fn create_transaction_endpoint(
    State(inventory): State<Inventory>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let builder = Transaction::build(&request.id, &account_id, request.amount, request.date)
        .project_id(request.project_id.as_deref())
        .transaction_type(
            request
                .transaction_type
                .unwrap_or(TransactionType::Purchase),
        )
        .description(&request.description)
        .subtotal(request.subtotal)
        .tax_rate_pct(request.tax_rate_pct)
        .tax_total(request.tax_total);

    let transaction = inventory.create_transaction(builder)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for getting a transaction, including its last audited
/// `needs_review` flag.
pub async fn get_transaction_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, transaction_id)): Path<(AccountId, TransactionId)>,
) -> Result<Json<Transaction>, Error> {
    inventory
        .get_transaction(&account_id, &transaction_id)
        .map(Json)
}

/// A route handler for editing a transaction.
pub async fn edit_transaction_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, transaction_id)): Path<(AccountId, TransactionId)>,
    Json(edit): Json<TransactionEdit>,
) -> Result<Json<Transaction>, Error> {
    inventory
        .edit_transaction(&account_id, &transaction_id, &edit)
        .map(Json)
}

/// A route handler for the live completeness of a transaction's items.
pub async fn get_completeness_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, transaction_id)): Path<(AccountId, TransactionId)>,
) -> Result<Json<CompletenessSnapshot>, Error> {
    inventory
        .get_completeness(&account_id, &transaction_id)
        .await
        .map(Json)
}

/// A route handler for adding several items to a transaction in one request.
pub async fn create_items_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, transaction_id)): Path<(AccountId, TransactionId)>,
    Json(requests): Json<Vec<ItemRequest>>,
) -> Result<(StatusCode, Json<Vec<Item>>), Error> {
    let new_items = requests
        .into_iter()
        .map(|request| request.into_new_item(&account_id))
        .collect();

    let items = inventory.create_items(&account_id, &transaction_id, new_items)?;

    Ok((StatusCode::CREATED, Json(items)))
}
