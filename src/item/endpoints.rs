//! Route handlers for the item API.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    Error, Inventory,
    database_id::{AccountId, ItemId, ProjectId, TransactionId},
    item::{Item, ItemEdit, NewItem},
};

/// The request body for creating an item.
///
/// The account comes from the route, not the body.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRequest {
    /// The project the item is allocated to.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// The transaction to link the item to.
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    /// A text description of the item.
    #[serde(default)]
    pub description: String,
    /// What the business paid for the item.
    #[serde(default)]
    pub purchase_price: Option<Decimal>,
    /// What the item is billed to the project at.
    #[serde(default)]
    pub project_price: Option<Decimal>,
    /// An explicit tax rate percentage.
    #[serde(default)]
    pub tax_rate_pct: Option<Decimal>,
}

impl ItemRequest {
    /// Convert the request into a [NewItem] owned by `account_id`.
    pub fn into_new_item(self, account_id: &str) -> NewItem {
        NewItem::new(account_id, &self.description)
            .project_id(self.project_id.as_deref())
            .transaction_id(self.transaction_id.as_deref())
            .purchase_price(self.purchase_price)
            .project_price(self.project_price)
            .tax_rate_pct(self.tax_rate_pct)
    }
}

/// A route handler for creating a new item.
pub async fn create_item_endpoint(
    State(inventory): State<Inventory>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<ItemRequest>,
) -> Result<(StatusCode, Json<Item>), Error> {
    let item = inventory.create_item(request.into_new_item(&account_id))?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// A route handler for editing an item.
pub async fn update_item_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, item_id)): Path<(AccountId, ItemId)>,
    Json(edit): Json<ItemEdit>,
) -> Result<Json<Item>, Error> {
    inventory.update_item(&account_id, item_id, &edit).map(Json)
}

/// A route handler for deleting an item, responds with the deleted item.
pub async fn delete_item_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, item_id)): Path<(AccountId, ItemId)>,
) -> Result<Json<Item>, Error> {
    inventory.delete_item(&account_id, item_id).map(Json)
}
