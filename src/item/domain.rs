//! Core item domain types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::database_id::{AccountId, ItemId, ProjectId, TransactionId};

/// A purchasable, trackable unit of inventory.
///
/// Items may be linked to at most one transaction. The link is a reference,
/// not ownership: unlinked items are valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Item {
    /// The ID of the item.
    pub id: ItemId,
    /// The business account that owns the item.
    pub account_id: AccountId,
    /// The project the item is allocated to, `None` while in business inventory.
    pub project_id: Option<ProjectId>,
    /// The transaction the item is linked to.
    pub transaction_id: Option<TransactionId>,
    /// A text description of the item.
    pub description: String,
    /// What the business paid for the item.
    pub purchase_price: Option<Decimal>,
    /// What the item is billed at on the project.
    pub project_price: Option<Decimal>,
    /// The tax rate as a percentage, inherited from the linked transaction at
    /// creation time when not given explicitly.
    pub tax_rate_pct: Option<Decimal>,
}

impl Item {
    /// The price that counts towards a transaction's item total, `None` if the
    /// item has not been priced yet.
    pub fn usable_price(&self) -> Option<Decimal> {
        self.project_price
    }
}

/// The data needed to create an [Item].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    /// The business account that will own the item.
    pub account_id: AccountId,
    /// The project the item is allocated to, `None` for business inventory.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// The transaction the item was bought or sold in.
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
    /// The tax rate as a percentage. Inherited from the linked transaction
    /// when not given.
    #[serde(default)]
    pub tax_rate_pct: Option<Decimal>,
}

impl NewItem {
    /// Start building an unlinked, unpriced item for `account_id`.
    pub fn new(account_id: &str, description: &str) -> Self {
        Self {
            account_id: account_id.to_owned(),
            project_id: None,
            transaction_id: None,
            description: description.to_owned(),
            purchase_price: None,
            project_price: None,
            tax_rate_pct: None,
        }
    }

    /// Link the item to a transaction.
    pub fn transaction_id(mut self, transaction_id: Option<&str>) -> Self {
        self.transaction_id = transaction_id.map(str::to_owned);
        self
    }

    /// Set the project the item is allocated to.
    pub fn project_id(mut self, project_id: Option<&str>) -> Self {
        self.project_id = project_id.map(str::to_owned);
        self
    }

    /// Set the purchase price.
    pub fn purchase_price(mut self, price: Option<Decimal>) -> Self {
        self.purchase_price = price;
        self
    }

    /// Set the project price.
    pub fn project_price(mut self, price: Option<Decimal>) -> Self {
        self.project_price = price;
        self
    }

    /// Set an explicit tax rate percentage.
    pub fn tax_rate_pct(mut self, tax_rate_pct: Option<Decimal>) -> Self {
        self.tax_rate_pct = tax_rate_pct;
        self
    }
}

/// The fields a user may change when editing an item.
///
/// Changing `transaction_id` moves the item between transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEdit {
    /// The transaction the item is linked to, `None` to unlink it.
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    /// The new description.
    #[serde(default)]
    pub description: String,
    /// The new purchase price.
    #[serde(default)]
    pub purchase_price: Option<Decimal>,
    /// The new project price.
    #[serde(default)]
    pub project_price: Option<Decimal>,
    /// The new tax rate percentage.
    #[serde(default)]
    pub tax_rate_pct: Option<Decimal>,
}

impl From<&Item> for ItemEdit {
    fn from(item: &Item) -> Self {
        Self {
            transaction_id: item.transaction_id.clone(),
            description: item.description.clone(),
            purchase_price: item.purchase_price,
            project_price: item.project_price,
            tax_rate_pct: item.tax_rate_pct,
        }
    }
}
