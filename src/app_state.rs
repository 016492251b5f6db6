//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    Error,
    audit::{Auditor, CoalescerConfig, SqliteAuditStore},
    db::initialize,
};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// Schedules the `needs_review` recomputation after each write.
    pub auditor: Auditor,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// The recompute coalescer shares `db_connection` with the request handlers.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, coalescer_config: CoalescerConfig) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));
        let auditor = Auditor::new(SqliteAuditStore::new(connection.clone()), coalescer_config);

        Ok(Self {
            db_connection: connection,
            auditor,
        })
    }
}
