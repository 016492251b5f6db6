//! Moving items between business inventory and projects.
//!
//! Allocating items into a project links them to the project's canonical
//! purchase transaction (`INV_PURCHASE_<project>`). Deallocating an item links
//! it to the project's canonical sale transaction (`INV_SALE_<project>`) and
//! returns it to inventory. The amounts of both canonical transactions always
//! equal the total of their linked items.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error, Inventory,
    audit::{FlushOptions, RecomputeKey},
    database_id::{AccountId, ItemId, ProjectId},
    inventory::refresh_canonical_total,
    item::{get_item, set_item_link},
    transaction::{
        CanonicalKind, Transaction, canonical_transaction_id, ensure_canonical_transaction,
        get_transaction,
    },
};

impl Inventory {
    /// Allocate `item_ids` into `project_id`.
    ///
    /// The project's purchase transaction is created on first use and audited
    /// once for the whole allocation. Transactions the items were previously
    /// linked to are audited as well.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if an item does not exist. Items allocated
    /// before the failing one stay allocated.
    pub fn allocate_items(
        &self,
        account_id: &str,
        project_id: &str,
        item_ids: &[ItemId],
        date: Date,
    ) -> Result<Transaction, Error> {
        let purchase_id = canonical_transaction_id(CanonicalKind::Purchase, project_id);
        let key = RecomputeKey::new(account_id, &purchase_id);
        let scope = self.auditor().batch(&key);

        {
            let connection = self.lock()?;
            ensure_canonical_transaction(
                account_id,
                project_id,
                CanonicalKind::Purchase,
                date,
                &connection,
            )?;
        }

        for &item_id in item_ids {
            let (previous_transaction, refreshed) = {
                let connection = self.lock()?;
                let previous = get_item(account_id, item_id, &connection)?;
                set_item_link(
                    account_id,
                    item_id,
                    Some(purchase_id.as_str()),
                    Some(project_id),
                    &connection,
                )?;
                let refreshed = previous
                    .transaction_id
                    .iter()
                    .map(String::as_str)
                    .chain([purchase_id.as_str()])
                    .try_for_each(|transaction_id| {
                        refresh_canonical_total(account_id, transaction_id, &connection)
                    });

                (previous.transaction_id, refreshed)
            };

            if let Some(transaction_id) = previous_transaction {
                self.mark_changed(&RecomputeKey::new(account_id, &transaction_id));
            }
            self.mark_changed(&key);
            refreshed?;
        }

        tracing::info!(
            "allocated {} items to project {project_id} in account {account_id}",
            item_ids.len()
        );
        scope.finish(FlushOptions::default());

        let connection = self.lock()?;
        get_transaction(account_id, &purchase_id, &connection)
    }

    /// Return an allocated item from its project to business inventory.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if the item does not exist,
    /// - or [Error::ItemNotAllocated] if the item is not in a project.
    pub fn deallocate_item(
        &self,
        account_id: &str,
        item_id: ItemId,
        date: Date,
    ) -> Result<Transaction, Error> {
        let (sale_id, previous_transaction, refreshed) = {
            let connection = self.lock()?;
            let item = get_item(account_id, item_id, &connection)?;
            let project_id = item
                .project_id
                .as_deref()
                .ok_or(Error::ItemNotAllocated(item_id))?;

            let sale = ensure_canonical_transaction(
                account_id,
                project_id,
                CanonicalKind::Sale,
                date,
                &connection,
            )?;
            set_item_link(account_id, item_id, Some(sale.id.as_str()), None, &connection)?;
            let refreshed = item
                .transaction_id
                .iter()
                .map(String::as_str)
                .chain([sale.id.as_str()])
                .try_for_each(|transaction_id| {
                    refresh_canonical_total(account_id, transaction_id, &connection)
                });

            (sale.id, item.transaction_id, refreshed)
        };

        if let Some(transaction_id) = previous_transaction {
            self.mark_changed(&RecomputeKey::new(account_id, &transaction_id));
        }
        self.mark_changed(&RecomputeKey::new(account_id, &sale_id));
        refreshed?;

        let connection = self.lock()?;
        get_transaction(account_id, &sale_id, &connection)
    }
}

/// The request body for allocating items into a project.
#[derive(Debug, Deserialize)]
pub struct AllocationRequest {
    /// The items to allocate.
    pub item_ids: Vec<ItemId>,
    /// The date recorded on a newly created purchase transaction, defaults to today.
    #[serde(default)]
    pub date: Option<Date>,
}

/// A route handler for allocating items into a project, responds with the
/// project's purchase transaction.
pub async fn allocate_items_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, project_id)): Path<(AccountId, ProjectId)>,
    Json(request): Json<AllocationRequest>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let date = request.date.unwrap_or_else(today);
    let transaction =
        inventory.allocate_items(&account_id, &project_id, &request.item_ids, date)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for returning an item from its project, responds with the
/// project's sale transaction.
pub async fn deallocate_item_endpoint(
    State(inventory): State<Inventory>,
    Path((account_id, item_id)): Path<(AccountId, ItemId)>,
) -> Result<Json<Transaction>, Error> {
    inventory
        .deallocate_item(&account_id, item_id, today())
        .map(Json)
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}
