//! Transaction writes that keep the `needs_review` flag up to date.

use crate::{
    Error, Inventory,
    audit::{CompletenessSnapshot, FlushOptions, RecomputeKey},
    transaction::{
        Transaction, TransactionBuilder, TransactionEdit, core::create_transaction,
        core::get_transaction, core::update_transaction, core::validate_transaction_edit,
    },
};

impl Inventory {
    /// Create a user entered transaction and schedule its first audit.
    ///
    /// # Errors
    /// See [create_transaction].
    pub fn create_transaction(&self, builder: TransactionBuilder) -> Result<Transaction, Error> {
        let transaction = {
            let connection = self.lock()?;
            create_transaction(builder, &connection)?
        };

        self.mark_changed(&RecomputeKey::new(
            &transaction.account_id,
            &transaction.id,
        ));

        Ok(transaction)
    }

    /// Retrieve a transaction owned by `account_id`.
    pub fn get_transaction(&self, account_id: &str, id: &str) -> Result<Transaction, Error> {
        let connection = self.lock()?;
        get_transaction(account_id, id, &connection)
    }

    /// Apply a user edit to a transaction.
    ///
    /// The user is looking at the transaction they just saved, so the audit
    /// runs without waiting for the debounce window.
    ///
    /// # Errors
    /// See [update_transaction].
    pub fn edit_transaction(
        &self,
        account_id: &str,
        id: &str,
        edit: &TransactionEdit,
    ) -> Result<Transaction, Error> {
        // Rejected edits change nothing and must not schedule an audit.
        validate_transaction_edit(account_id, id, edit, &*self.lock()?)?;

        let key = RecomputeKey::new(account_id, id);
        let scope = self.auditor().batch(&key);

        let transaction = {
            let connection = self.lock()?;
            update_transaction(account_id, id, edit, &connection)?
        };

        scope.finish(FlushOptions::immediate());

        Ok(transaction)
    }

    /// Compute the completeness of a transaction from its current items.
    ///
    /// Nothing is persisted.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if the transaction does not exist.
    pub async fn get_completeness(
        &self,
        account_id: &str,
        id: &str,
    ) -> Result<CompletenessSnapshot, Error> {
        self.auditor()
            .get_completeness(&RecomputeKey::new(account_id, id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::date;
    use tokio::time::Instant;

    use crate::{
        Error,
        audit::CompletenessStatus,
        inventory::test_utils::{TEST_DEBOUNCE, get_test_inventory},
        item::NewItem,
        transaction::{CanonicalKind, Transaction, TransactionEdit, ensure_canonical_transaction},
    };

    #[tokio::test(start_paused = true)]
    async fn new_transaction_without_items_needs_review() {
        let inventory = get_test_inventory();

        inventory
            .create_transaction(
                Transaction::build("txn-1", "acme", dec!(108.88), date!(2025 - 03 - 01))
                    .tax_rate_pct(Some(dec!(8.875))),
            )
            .unwrap();
        inventory.auditor().settle().await;

        let transaction = inventory.get_transaction("acme", "txn-1").unwrap();
        assert!(transaction.needs_review);
    }

    #[tokio::test(start_paused = true)]
    async fn new_transaction_without_items_or_tax_data_is_not_flagged() {
        let inventory = get_test_inventory();

        inventory
            .create_transaction(Transaction::build(
                "txn-1",
                "acme",
                dec!(100),
                date!(2025 - 03 - 01),
            ))
            .unwrap();
        inventory.auditor().settle().await;

        let transaction = inventory.get_transaction("acme", "txn-1").unwrap();
        assert!(!transaction.needs_review);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_transaction_without_items_is_complete() {
        let inventory = get_test_inventory();

        inventory
            .create_transaction(Transaction::build(
                "txn-1",
                "acme",
                dec!(0),
                date!(2025 - 03 - 01),
            ))
            .unwrap();
        inventory.auditor().settle().await;

        assert!(!inventory.get_transaction("acme", "txn-1").unwrap().needs_review);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_recomputes_without_debounce() {
        let inventory = get_test_inventory();
        inventory
            .create_transaction(
                Transaction::build("txn-1", "acme", dec!(108), date!(2025 - 03 - 01))
                    .subtotal(Some(dec!(100))),
            )
            .unwrap();
        inventory
            .create_item(
                NewItem::new("acme", "Lamp")
                    .transaction_id(Some("txn-1"))
                    .project_price(Some(dec!(100))),
            )
            .unwrap();
        inventory.auditor().settle().await;
        assert!(!inventory.get_transaction("acme", "txn-1").unwrap().needs_review);

        let start = Instant::now();
        let edit = TransactionEdit {
            amount: dec!(216),
            date: date!(2025 - 03 - 01),
            description: "Two lamps".to_owned(),
            subtotal: Some(dec!(200)),
            tax_rate_pct: None,
            tax_total: None,
        };
        inventory.edit_transaction("acme", "txn-1", &edit).unwrap();
        inventory.auditor().settle().await;

        assert!(start.elapsed() < TEST_DEBOUNCE, "took {:?}", start.elapsed());
        assert!(inventory.get_transaction("acme", "txn-1").unwrap().needs_review);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_edit_closes_its_batch() {
        let inventory = get_test_inventory();
        let edit = TransactionEdit {
            amount: dec!(1),
            date: date!(2025 - 03 - 01),
            description: String::new(),
            subtotal: None,
            tax_rate_pct: None,
            tax_total: None,
        };

        let result = inventory.edit_transaction("acme", "missing", &edit);

        assert_eq!(result, Err(Error::UpdateMissingTransaction));
        let key = crate::audit::RecomputeKey::new("acme", "missing");
        assert!(!inventory.auditor().is_batch_active(&key));
        assert_eq!(inventory.auditor().tracked_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_canonical_edit_schedules_nothing() {
        let inventory = get_test_inventory();
        let canonical = {
            let connection = inventory.lock().unwrap();
            ensure_canonical_transaction(
                "acme",
                "loft",
                CanonicalKind::Purchase,
                date!(2025 - 03 - 01),
                &connection,
            )
            .unwrap()
        };
        let edit = TransactionEdit {
            amount: dec!(500),
            date: canonical.date,
            description: canonical.description.clone(),
            subtotal: None,
            tax_rate_pct: None,
            tax_total: None,
        };

        let result = inventory.edit_transaction("acme", &canonical.id, &edit);

        assert_eq!(result, Err(Error::CanonicalAmountReadOnly(canonical.id)));
        assert_eq!(inventory.auditor().tracked_keys(), 0);
    }

    #[tokio::test]
    async fn completeness_reads_current_items() {
        let inventory = get_test_inventory();
        inventory
            .create_transaction(
                Transaction::build("txn-1", "acme", dec!(108), date!(2025 - 03 - 01))
                    .tax_total(Some(dec!(8))),
            )
            .unwrap();
        inventory
            .create_item(
                NewItem::new("acme", "Rug")
                    .transaction_id(Some("txn-1"))
                    .project_price(Some(dec!(85))),
            )
            .unwrap();

        let snapshot = inventory.get_completeness("acme", "txn-1").await.unwrap();

        assert_eq!(snapshot.transaction_subtotal, dec!(100));
        assert_eq!(snapshot.items_net_total, dec!(85));
        assert_eq!(snapshot.completeness_status, CompletenessStatus::Near);
    }

    #[tokio::test]
    async fn completeness_of_missing_transaction_is_not_found() {
        let inventory = get_test_inventory();

        assert_eq!(
            inventory.get_completeness("acme", "nope").await,
            Err(Error::NotFound)
        );
    }
}
