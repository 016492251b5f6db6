//! The persistence the recompute pipeline needs: read a transaction, read its
//! linked items, write one boolean.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::Connection;

use crate::{
    Error,
    audit::RecomputeKey,
    item::{Item, get_items_for_transaction},
    transaction::{Transaction, get_transaction, set_needs_review},
};

/// Storage used by [crate::audit::RecomputeCoalescer].
///
/// Each method is a suspension point where other requests for the same key
/// may arrive. Implementations must be safe to call repeatedly with the same
/// arguments.
pub trait AuditStore: Send + Sync + 'static {
    /// Load the transaction identified by `key`.
    fn load_transaction(
        &self,
        key: &RecomputeKey,
    ) -> impl Future<Output = Result<Transaction, Error>> + Send;

    /// Load the items currently linked to the transaction identified by `key`.
    fn load_items(&self, key: &RecomputeKey) -> impl Future<Output = Result<Vec<Item>, Error>> + Send;

    /// Persist the derived `needs_review` flag.
    fn save_needs_review(
        &self,
        key: &RecomputeKey,
        needs_review: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// An [AuditStore] backed by the application's SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteAuditStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    /// Create a new store for the SQLite `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }
}

impl AuditStore for SqliteAuditStore {
    async fn load_transaction(&self, key: &RecomputeKey) -> Result<Transaction, Error> {
        let connection = self.lock()?;
        get_transaction(&key.account_id, &key.transaction_id, &connection)
    }

    async fn load_items(&self, key: &RecomputeKey) -> Result<Vec<Item>, Error> {
        let connection = self.lock()?;
        get_items_for_transaction(&key.account_id, &key.transaction_id, &connection)
    }

    async fn save_needs_review(&self, key: &RecomputeKey, needs_review: bool) -> Result<(), Error> {
        let connection = self.lock()?;
        set_needs_review(&key.account_id, &key.transaction_id, needs_review, &connection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        audit::{AuditStore, RecomputeKey, SqliteAuditStore},
        db::initialize,
        item::{NewItem, create_item},
        transaction::{Transaction, create_transaction},
    };

    fn get_test_store() -> SqliteAuditStore {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        create_transaction(
            Transaction::build("txn-1", "acme", dec!(100), date!(2025 - 01 - 01)),
            &connection,
        )
        .unwrap();
        create_item(
            NewItem::new("acme", "Vase").transaction_id(Some("txn-1")),
            &connection,
        )
        .unwrap();

        SqliteAuditStore::new(Arc::new(Mutex::new(connection)))
    }

    #[tokio::test]
    async fn loads_transaction_and_items() {
        let store = get_test_store();
        let key = RecomputeKey::new("acme", "txn-1");

        let transaction = store.load_transaction(&key).await.unwrap();
        let items = store.load_items(&key).await.unwrap();

        assert_eq!(transaction.id, "txn-1");
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn saves_needs_review() {
        let store = get_test_store();
        let key = RecomputeKey::new("acme", "txn-1");

        store.save_needs_review(&key, true).await.unwrap();

        assert!(store.load_transaction(&key).await.unwrap().needs_review);
    }

    #[tokio::test]
    async fn missing_transaction_is_not_found() {
        let store = get_test_store();
        let key = RecomputeKey::new("acme", "nope");

        assert_eq!(store.load_transaction(&key).await, Err(Error::NotFound));
    }
}
