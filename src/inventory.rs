//! The service that every write to items and transactions goes through.
//!
//! Each operation writes under the connection lock, releases the lock and then
//! asks the [Auditor] to recompute the affected transactions. The operations
//! themselves live next to the models they touch, see `transaction::service`,
//! `item::service` and `allocation`.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    audit::{Auditor, RecomputeKey},
    item::linked_items_total,
    transaction::{is_canonical_transaction_id, set_canonical_total},
};

/// Shared handle to the database and the recompute coalescer.
#[derive(Debug, Clone)]
pub struct Inventory {
    db_connection: Arc<Mutex<Connection>>,
    auditor: Auditor,
}

impl FromRef<AppState> for Inventory {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.db_connection.clone(), state.auditor.clone())
    }
}

impl Inventory {
    /// Create a service writing to `db_connection` and scheduling recomputes
    /// on `auditor`.
    pub fn new(db_connection: Arc<Mutex<Connection>>, auditor: Auditor) -> Self {
        Self {
            db_connection,
            auditor,
        }
    }

    /// The coalescer recomputes are scheduled on.
    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }

    /// Request a recompute for `key`, unless an enclosing batch will do it.
    pub(crate) fn mark_changed(&self, key: &RecomputeKey) {
        if self.auditor.is_batch_active(key) {
            tracing::trace!("{key} changed inside a batch, deferring recompute");
            return;
        }

        self.auditor.request_recompute(key);
    }
}

/// Recompute the amount of a canonical transaction from its linked items.
///
/// User entered transactions are left alone.
pub(crate) fn refresh_canonical_total(
    account_id: &str,
    transaction_id: &str,
    connection: &Connection,
) -> Result<(), Error> {
    if !is_canonical_transaction_id(transaction_id) {
        return Ok(());
    }

    let total = linked_items_total(account_id, transaction_id, connection)?;
    set_canonical_total(account_id, transaction_id, total, connection)?;
    tracing::debug!("canonical transaction {transaction_id} now totals {total}");

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rusqlite::Connection;

    use crate::{
        Inventory,
        audit::{Auditor, CoalescerConfig, SqliteAuditStore},
        db::initialize,
    };

    pub(crate) const TEST_DEBOUNCE: Duration = Duration::from_millis(100);

    pub(crate) fn get_test_inventory() -> Inventory {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let connection = Arc::new(Mutex::new(connection));
        let auditor = Auditor::new(
            SqliteAuditStore::new(connection.clone()),
            CoalescerConfig {
                debounce: TEST_DEBOUNCE,
                idle_ttl: Duration::from_secs(60),
            },
        );

        Inventory::new(connection, auditor)
    }
}
