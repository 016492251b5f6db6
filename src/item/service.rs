//! Item writes that keep the linked transactions' `needs_review` flags up to
//! date.

use crate::{
    Error, Inventory,
    audit::{FlushOptions, RecomputeKey},
    database_id::ItemId,
    inventory::refresh_canonical_total,
    item::{Item, ItemEdit, NewItem, db},
};

impl Inventory {
    /// Create an item and schedule an audit of the transaction it is linked
    /// to, if any.
    ///
    /// # Errors
    /// See [db::create_item].
    pub fn create_item(&self, new_item: NewItem) -> Result<Item, Error> {
        let (item, refreshed) = {
            let connection = self.lock()?;
            let item = db::create_item(new_item, &connection)?;
            let refreshed = match &item.transaction_id {
                Some(transaction_id) => {
                    refresh_canonical_total(&item.account_id, transaction_id, &connection)
                }
                None => Ok(()),
            };

            (item, refreshed)
        };

        // The item is already stored, so its transaction is audited even if
        // the canonical total could not be refreshed.
        if let Some(transaction_id) = &item.transaction_id {
            self.mark_changed(&RecomputeKey::new(&item.account_id, transaction_id));
        }
        refreshed?;

        Ok(item)
    }

    /// Create several items for one transaction as a single change.
    ///
    /// However many items are created, the transaction is audited once. If an
    /// item fails to insert, the items before it are kept and still audited.
    ///
    /// # Errors
    /// Returns the first error from [db::create_item].
    pub fn create_items(
        &self,
        account_id: &str,
        transaction_id: &str,
        new_items: Vec<NewItem>,
    ) -> Result<Vec<Item>, Error> {
        let key = RecomputeKey::new(account_id, transaction_id);
        let scope = self.auditor().batch(&key);

        let mut items = Vec::with_capacity(new_items.len());
        for mut new_item in new_items {
            new_item.account_id = account_id.to_owned();
            items.push(self.create_item(new_item.transaction_id(Some(transaction_id)))?);
        }

        tracing::debug!("created {} items for {key}", items.len());
        scope.finish(FlushOptions::default());

        Ok(items)
    }

    /// Apply a user edit to an item.
    ///
    /// Moving the item to another transaction audits both the transaction it
    /// left and the one it joined.
    ///
    /// # Errors
    /// See [db::update_item].
    pub fn update_item(
        &self,
        account_id: &str,
        item_id: ItemId,
        edit: &ItemEdit,
    ) -> Result<Item, Error> {
        let (previous, updated, refreshed) = {
            let connection = self.lock()?;
            let previous = match db::get_item(account_id, item_id, &connection) {
                Err(Error::NotFound) => return Err(Error::UpdateMissingItem),
                result => result?,
            };
            let updated = db::update_item(account_id, item_id, edit, &connection)?;
            let refreshed = touched_transactions(&previous, &updated)
                .into_iter()
                .try_for_each(|transaction_id| {
                    refresh_canonical_total(account_id, transaction_id, &connection)
                });

            (previous, updated, refreshed)
        };

        for transaction_id in touched_transactions(&previous, &updated) {
            self.mark_changed(&RecomputeKey::new(account_id, transaction_id));
        }
        refreshed?;

        Ok(updated)
    }

    /// Delete an item and schedule an audit of the transaction it was linked
    /// to.
    ///
    /// # Errors
    /// See [db::delete_item].
    pub fn delete_item(&self, account_id: &str, item_id: ItemId) -> Result<Item, Error> {
        let (item, refreshed) = {
            let connection = self.lock()?;
            let item = db::delete_item(account_id, item_id, &connection)?;
            let refreshed = match &item.transaction_id {
                Some(transaction_id) => {
                    refresh_canonical_total(account_id, transaction_id, &connection)
                }
                None => Ok(()),
            };

            (item, refreshed)
        };

        if let Some(transaction_id) = &item.transaction_id {
            self.mark_changed(&RecomputeKey::new(account_id, transaction_id));
        }
        refreshed?;

        Ok(item)
    }
}

/// The distinct transactions an item was or is now linked to.
fn touched_transactions<'a>(previous: &'a Item, updated: &'a Item) -> Vec<&'a str> {
    let mut transaction_ids: Vec<&str> = previous
        .transaction_id
        .iter()
        .chain(updated.transaction_id.iter())
        .map(String::as_str)
        .collect();
    transaction_ids.dedup();

    transaction_ids
}
