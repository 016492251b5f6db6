//! Inventory ledger is a service for tracking the items and transactions of
//! an interior design business.
//!
//! This library provides a JSON API over the item and transaction records, and
//! keeps each transaction's `needs_review` flag in step with its linked items
//! (see [audit]).

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod allocation;
mod app_state;
pub mod audit;
mod database_id;
mod db;
pub mod endpoints;
mod inventory;
pub mod item;
mod logging;
mod money;
mod routing;
pub mod transaction;

pub use app_state::AppState;
pub use database_id::{AccountId, DatabaseId, ItemId, ProjectId, TransactionId};
pub use db::initialize as initialize_db;
pub use inventory::Inventory;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use money::round_currency;
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl+c: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// A stored transaction type was not one of the known types.
    #[error("\"{0}\" is not a valid transaction type")]
    InvalidTransactionType(String),

    /// A user tried to create a transaction with an ID that uses the prefix
    /// reserved for system generated transactions.
    #[error("the transaction ID \"{0}\" uses a reserved prefix")]
    ReservedTransactionId(String),

    /// The specified transaction ID already exists in the database.
    #[error("a transaction with the ID \"{0}\" already exists")]
    DuplicateTransactionId(String),

    /// A user tried to change the amount of a system generated transaction.
    ///
    /// The amount of these transactions is always the total of their items.
    #[error("the amount of transaction \"{0}\" is calculated from its items and cannot be edited")]
    CanonicalAmountReadOnly(String),

    /// An item referenced a transaction that does not exist in the account.
    #[error("the transaction \"{0}\" does not exist")]
    InvalidTransactionLink(String),

    /// An item cannot be returned from a project it was never allocated to.
    #[error("item {0} is not allocated to a project")]
    ItemNotAllocated(ItemId),

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to update an item that does not exist
    #[error("tried to update an item that is not in the database")]
    UpdateMissingItem,

    /// Tried to delete an item that does not exist
    #[error("tried to delete an item that is not in the database")]
    DeleteMissingItem,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::InvalidTransactionLink(String::new()),
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound
            | Error::UpdateMissingTransaction
            | Error::UpdateMissingItem
            | Error::DeleteMissingItem => StatusCode::NOT_FOUND,
            Error::ReservedTransactionId(_)
            | Error::CanonicalAmountReadOnly(_)
            | Error::InvalidTransactionLink(_)
            | Error::InvalidTransactionType(_)
            | Error::ItemNotAllocated(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::DuplicateTransactionId(_) => StatusCode::CONFLICT,
            Error::SqlError(_) | Error::DatabaseLockError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Internal errors are not intended to be shown to the client.
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
