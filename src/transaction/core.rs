//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    database_id::{AccountId, ProjectId, TransactionId},
    money::{decimal_from_sql, optional_decimal_from_sql},
};

// ============================================================================
// MODELS
// ============================================================================

/// The kind of financial event a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money spent buying items.
    Purchase,
    /// Money received for items.
    Sale,
    /// Money refunded for items that were sent back.
    Return,
}

impl TransactionType {
    /// The string stored in the database for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Sale => "sale",
            TransactionType::Return => "return",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "sale" => Ok(TransactionType::Sale),
            "return" => Ok(TransactionType::Return),
            other => Err(Error::InvalidTransactionType(other.to_owned())),
        }
    }
}

/// A single financial event (purchase, sale or return) tied to a project or
/// to the business inventory pool.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The business account that owns the transaction.
    pub account_id: AccountId,
    /// The project the transaction belongs to, `None` for business inventory.
    pub project_id: Option<ProjectId>,
    /// Whether this was a purchase, sale or return.
    pub transaction_type: TransactionType,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The total entered by the user, including tax.
    pub amount: Decimal,
    /// The pre-tax subtotal, if it was recorded.
    pub subtotal: Option<Decimal>,
    /// The tax rate as a percentage, e.g. `8.875`.
    pub tax_rate_pct: Option<Decimal>,
    /// The total amount of tax paid, if it was recorded.
    pub tax_total: Option<Decimal>,
    /// Whether the linked items fail to reconcile against the subtotal.
    ///
    /// Only the recompute pipeline in [crate::audit] writes this field.
    pub needs_review: bool,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        id: &str,
        account_id: &str,
        amount: Decimal,
        date: Date,
    ) -> TransactionBuilder {
        TransactionBuilder {
            id: id.to_owned(),
            account_id: account_id.to_owned(),
            project_id: None,
            transaction_type: TransactionType::Purchase,
            date,
            description: String::new(),
            amount,
            subtotal: None,
            tax_rate_pct: None,
            tax_total: None,
        }
    }

    /// Whether this transaction is one of the system generated canonical transactions.
    pub fn is_canonical(&self) -> bool {
        is_canonical_transaction_id(&self.id)
    }
}

/// A builder for creating [Transaction] instances.
///
/// Optional fields default to `None`, the type defaults to a purchase and the
/// description defaults to an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBuilder {
    /// The unique ID for the new transaction.
    pub id: TransactionId,
    /// The business account that owns the transaction.
    pub account_id: AccountId,
    /// The project the transaction belongs to.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// Whether this was a purchase, sale or return.
    pub transaction_type: TransactionType,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of the transaction.
    #[serde(default)]
    pub description: String,
    /// The total entered by the user, including tax.
    pub amount: Decimal,
    /// The pre-tax subtotal.
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    /// The tax rate as a percentage.
    #[serde(default)]
    pub tax_rate_pct: Option<Decimal>,
    /// The total amount of tax paid.
    #[serde(default)]
    pub tax_total: Option<Decimal>,
}

impl TransactionBuilder {
    /// Set the project for the transaction.
    pub fn project_id(mut self, project_id: Option<&str>) -> Self {
        self.project_id = project_id.map(str::to_owned);
        self
    }

    /// Set the transaction type.
    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    /// Set the pre-tax subtotal.
    pub fn subtotal(mut self, subtotal: Option<Decimal>) -> Self {
        self.subtotal = subtotal;
        self
    }

    /// Set the tax rate percentage.
    pub fn tax_rate_pct(mut self, tax_rate_pct: Option<Decimal>) -> Self {
        self.tax_rate_pct = tax_rate_pct;
        self
    }

    /// Set the tax total.
    pub fn tax_total(mut self, tax_total: Option<Decimal>) -> Self {
        self.tax_total = tax_total;
        self
    }
}

/// The fields a user may change when editing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEdit {
    /// The new total.
    pub amount: Decimal,
    /// The new date.
    pub date: Date,
    /// The new description.
    #[serde(default)]
    pub description: String,
    /// The new pre-tax subtotal.
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    /// The new tax rate percentage.
    #[serde(default)]
    pub tax_rate_pct: Option<Decimal>,
    /// The new tax total.
    #[serde(default)]
    pub tax_total: Option<Decimal>,
}

// ============================================================================
// CANONICAL TRANSACTIONS
// ============================================================================

/// The ID prefix reserved for system generated transactions.
pub const CANONICAL_ID_PREFIX: &str = "INV_";

/// The system generated transactions that track inventory moving between
/// the business and a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalKind {
    /// Items allocated from business inventory into a project.
    Purchase,
    /// Items deallocated from a project back into business inventory.
    Sale,
}

impl CanonicalKind {
    fn id_prefix(&self) -> &'static str {
        match self {
            CanonicalKind::Purchase => "INV_PURCHASE_",
            CanonicalKind::Sale => "INV_SALE_",
        }
    }

    /// The transaction type recorded on the canonical transaction.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            CanonicalKind::Purchase => TransactionType::Purchase,
            CanonicalKind::Sale => TransactionType::Sale,
        }
    }
}

/// The ID of the canonical transaction of `kind` for `project_id`.
pub fn canonical_transaction_id(kind: CanonicalKind, project_id: &str) -> TransactionId {
    format!("{}{project_id}", kind.id_prefix())
}

/// Whether `id` uses the reserved canonical ID prefix.
pub fn is_canonical_transaction_id(id: &str) -> bool {
    id.starts_with(CANONICAL_ID_PREFIX)
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, account_id, project_id, transaction_type, date, \
    description, amount, subtotal, tax_rate_pct, tax_total, needs_review";

/// Create a new user entered transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::ReservedTransactionId] if the ID uses the canonical prefix,
/// - or [Error::DuplicateTransactionId] if the ID is already taken,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    if is_canonical_transaction_id(&builder.id) {
        return Err(Error::ReservedTransactionId(builder.id));
    }

    insert_transaction(builder, connection)
}

fn insert_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (id, account_id, project_id, transaction_type, date, \
             description, amount, subtotal, tax_rate_pct, tax_total)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            params![
                builder.id,
                builder.account_id,
                builder.project_id,
                builder.transaction_type.as_str(),
                builder.date,
                builder.description,
                builder.amount.to_string(),
                builder.subtotal.map(|value| value.to_string()),
                builder.tax_rate_pct.map(|value| value.to_string()),
                builder.tax_total.map(|value| value.to_string()),
            ],
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY,
                },
                _,
            ) => Error::DuplicateTransactionId(builder.id.clone()),
            error => error.into(),
        })
}

/// Get the canonical transaction of `kind` for `project_id`, creating an empty
/// one if it does not exist yet.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn ensure_canonical_transaction(
    account_id: &str,
    project_id: &str,
    kind: CanonicalKind,
    date: Date,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let id = canonical_transaction_id(kind, project_id);

    if let Some(transaction) = find_transaction(account_id, &id, connection)? {
        return Ok(transaction);
    }

    tracing::debug!("creating canonical transaction {id} for account {account_id}");
    let builder = Transaction::build(&id, account_id, Decimal::ZERO, date)
        .project_id(Some(project_id))
        .transaction_type(kind.transaction_type())
        .description(match kind {
            CanonicalKind::Purchase => "Inventory allocated to project",
            CanonicalKind::Sale => "Inventory returned from project",
        });

    insert_transaction(builder, connection)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `account_id`,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(
    account_id: &str,
    id: &str,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" \
             WHERE id = :id AND account_id = :account_id"
        ))?
        .query_one(
            &[(":id", &id), (":account_id", &account_id)],
            map_transaction_row,
        )?;

    Ok(transaction)
}

fn find_transaction(
    account_id: &str,
    id: &str,
    connection: &Connection,
) -> Result<Option<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" \
             WHERE id = :id AND account_id = :account_id"
        ))?
        .query_row(
            &[(":id", &id), (":account_id", &account_id)],
            map_transaction_row,
        )
        .optional()
        .map_err(Error::from)
}

/// Apply a user edit to a transaction.
///
/// Items already linked to the transaction keep their tax rate even if the
/// edit changes the transaction's rate.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if the transaction does not exist,
/// - or [Error::CanonicalAmountReadOnly] if the edit changes the amount of a
///   canonical transaction,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    account_id: &str,
    id: &str,
    edit: &TransactionEdit,
    connection: &Connection,
) -> Result<Transaction, Error> {
    validate_transaction_edit(account_id, id, edit, connection)?;

    connection.execute(
        "UPDATE \"transaction\"
        SET \
            amount = ?1, \
            date = ?2, \
            description = ?3, \
            subtotal = ?4, \
            tax_rate_pct = ?5, \
            tax_total = ?6 \
        WHERE id = ?7 AND account_id = ?8;",
        params![
            edit.amount.to_string(),
            edit.date,
            edit.description,
            edit.subtotal.map(|value| value.to_string()),
            edit.tax_rate_pct.map(|value| value.to_string()),
            edit.tax_total.map(|value| value.to_string()),
            id,
            account_id,
        ],
    )?;

    get_transaction(account_id, id, connection)
}

/// Check that `edit` could be applied to the transaction without writing it.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if the transaction does not exist,
/// - or [Error::CanonicalAmountReadOnly] if the edit changes the amount of a
///   canonical transaction,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn validate_transaction_edit(
    account_id: &str,
    id: &str,
    edit: &TransactionEdit,
    connection: &Connection,
) -> Result<(), Error> {
    let existing =
        find_transaction(account_id, id, connection)?.ok_or(Error::UpdateMissingTransaction)?;

    if existing.is_canonical() && existing.amount != edit.amount {
        return Err(Error::CanonicalAmountReadOnly(existing.id));
    }

    Ok(())
}

/// Overwrite the amount and subtotal of a canonical transaction with `total`.
///
/// Non-canonical transactions are left untouched and `Ok(false)` is returned,
/// user entered amounts are never recomputed.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn set_canonical_total(
    account_id: &str,
    id: &str,
    total: Decimal,
    connection: &Connection,
) -> Result<bool, Error> {
    if !is_canonical_transaction_id(id) {
        return Ok(false);
    }

    let rows_affected = connection.execute(
        "UPDATE \"transaction\" SET amount = ?1, subtotal = ?1 WHERE id = ?2 AND account_id = ?3",
        params![total.to_string(), id, account_id],
    )?;

    Ok(rows_affected > 0)
}

/// Persist the derived `needs_review` flag for a transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if the transaction does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn set_needs_review(
    account_id: &str,
    id: &str,
    needs_review: bool,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE \"transaction\" SET needs_review = ?1 WHERE id = ?2 AND account_id = ?3",
        params![needs_review, id, account_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingTransaction);
    }

    Ok(())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                project_id TEXT,
                transaction_type TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount TEXT NOT NULL,
                subtotal TEXT,
                tax_rate_pct TEXT,
                tax_total TEXT,
                needs_review INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY(account_id, id)
                );

        CREATE INDEX IF NOT EXISTS idx_transaction_account_project
            ON \"transaction\"(account_id, project_id);",
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let account_id = row.get(1)?;
    let project_id = row.get(2)?;
    let raw_type: String = row.get(3)?;
    let transaction_type = raw_type.parse().map_err(|error: Error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(error))
    })?;
    let date = row.get(4)?;
    let description = row.get(5)?;
    let raw_amount: String = row.get(6)?;
    let amount = decimal_from_sql(&raw_amount, 6)?;
    let subtotal = optional_decimal_from_sql(row.get(7)?, 7)?;
    let tax_rate_pct = optional_decimal_from_sql(row.get(8)?, 8)?;
    let tax_total = optional_decimal_from_sql(row.get(9)?, 9)?;
    let needs_review = row.get(10)?;

    Ok(Transaction {
        id,
        account_id,
        project_id,
        transaction_type,
        date,
        description,
        amount,
        subtotal,
        tax_rate_pct,
        tax_total,
        needs_review,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod canonical_id_tests {
    use super::{CanonicalKind, canonical_transaction_id, is_canonical_transaction_id};

    #[test]
    fn canonical_ids_use_reserved_prefix() {
        let purchase = canonical_transaction_id(CanonicalKind::Purchase, "kitchen");
        let sale = canonical_transaction_id(CanonicalKind::Sale, "kitchen");

        assert_eq!(purchase, "INV_PURCHASE_kitchen");
        assert_eq!(sale, "INV_SALE_kitchen");
        assert!(is_canonical_transaction_id(&purchase));
        assert!(is_canonical_transaction_id(&sale));
    }

    #[test]
    fn user_ids_are_not_canonical() {
        assert!(!is_canonical_transaction_id("txn-42"));
        assert!(!is_canonical_transaction_id("inv_lowercase"));
    }
}
