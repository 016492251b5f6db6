//! Transaction management for the inventory ledger.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - The canonical, system generated transactions used for inventory allocation
//! - Database functions for storing, querying, and managing transactions
//! - Route handlers for the transaction API

mod core;
mod endpoints;
mod service;

pub use core::{
    CANONICAL_ID_PREFIX, CanonicalKind, Transaction, TransactionBuilder, TransactionEdit,
    TransactionType, canonical_transaction_id, create_transaction, create_transaction_table,
    ensure_canonical_transaction, get_transaction, is_canonical_transaction_id,
    map_transaction_row, set_canonical_total, set_needs_review, update_transaction,
    validate_transaction_edit,
};
pub use endpoints::{
    create_items_endpoint, create_transaction_endpoint, edit_transaction_endpoint,
    get_completeness_endpoint, get_transaction_endpoint,
};
