//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// The ID of an inventory item.
pub type ItemId = DatabaseId;

/// The ID of the business account that owns transactions and items.
pub type AccountId = String;

/// The ID of a transaction.
///
/// Transaction IDs are strings because canonical transactions use IDs that are
/// derived from the project they belong to, see
/// [crate::transaction::canonical_transaction_id].
pub type TransactionId = String;

/// The ID of a design project.
pub type ProjectId = String;
