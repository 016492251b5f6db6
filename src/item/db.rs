//! Database operations for items.

use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;

use crate::{
    Error,
    database_id::ItemId,
    item::{Item, ItemEdit, NewItem},
    money::{optional_decimal_from_sql, round_currency},
};

const ITEM_COLUMNS: &str = "id, account_id, project_id, transaction_id, description, \
    purchase_price, project_price, tax_rate_pct";

/// Create an item and return it with its generated ID.
///
/// An item linked to a transaction without an explicit tax rate inherits the
/// transaction's rate. The rate is copied once, here, and never again.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidTransactionLink] if `transaction_id` does not refer to a
///   transaction owned by the same account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_item(new_item: NewItem, connection: &Connection) -> Result<Item, Error> {
    let mut tax_rate_pct = new_item.tax_rate_pct;

    if let Some(transaction_id) = &new_item.transaction_id {
        let parent_rate = linked_transaction_tax_rate(&new_item.account_id, transaction_id, connection)?;

        if tax_rate_pct.is_none() {
            tax_rate_pct = parent_rate;
        }
    }

    connection
        .prepare(&format!(
            "INSERT INTO item (account_id, project_id, transaction_id, description, \
             purchase_price, project_price, tax_rate_pct)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING {ITEM_COLUMNS}"
        ))?
        .query_row(
            params![
                new_item.account_id,
                new_item.project_id,
                new_item.transaction_id,
                new_item.description,
                new_item.purchase_price.map(|value| value.to_string()),
                new_item.project_price.map(|value| value.to_string()),
                tax_rate_pct.map(|value| value.to_string()),
            ],
            map_item_row,
        )
        .map_err(Error::from)
}

/// Look up the tax rate of the transaction an item is being linked to.
///
/// Returns [Error::InvalidTransactionLink] if the transaction does not exist
/// for `account_id`.
fn linked_transaction_tax_rate(
    account_id: &str,
    transaction_id: &str,
    connection: &Connection,
) -> Result<Option<Decimal>, Error> {
    let raw_rate: Option<Option<String>> = connection
        .prepare(
            "SELECT tax_rate_pct FROM \"transaction\" WHERE id = :id AND account_id = :account_id",
        )?
        .query_row(
            &[(":id", &transaction_id), (":account_id", &account_id)],
            |row| row.get(0),
        )
        .optional()?;

    match raw_rate {
        Some(rate) => Ok(optional_decimal_from_sql(rate, 0)?),
        None => Err(Error::InvalidTransactionLink(transaction_id.to_owned())),
    }
}

/// Retrieve a single item by ID.
pub fn get_item(account_id: &str, item_id: ItemId, connection: &Connection) -> Result<Item, Error> {
    connection
        .prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM item WHERE id = ?1 AND account_id = ?2;"
        ))?
        .query_row(params![item_id, account_id], map_item_row)
        .map_err(|error| error.into())
}

/// Retrieve every item linked to a transaction, in insertion order.
pub fn get_items_for_transaction(
    account_id: &str,
    transaction_id: &str,
    connection: &Connection,
) -> Result<Vec<Item>, Error> {
    connection
        .prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM item \
             WHERE account_id = ?1 AND transaction_id = ?2 ORDER BY id ASC;"
        ))?
        .query_map(params![account_id, transaction_id], map_item_row)?
        .map(|maybe_item| maybe_item.map_err(|error| error.into()))
        .collect()
}

/// Sum the usable prices of the items linked to a transaction.
///
/// Prices are stored as text so the sum is done here rather than with SQL
/// `SUM`, which would go through floating point. The sum saturates at the
/// [Decimal] bounds.
pub fn linked_items_total(
    account_id: &str,
    transaction_id: &str,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let total = get_items_for_transaction(account_id, transaction_id, connection)?
        .iter()
        .filter_map(Item::usable_price)
        .fold(Decimal::ZERO, Decimal::saturating_add);

    Ok(round_currency(total))
}

/// Apply a user edit to an item.
///
/// Linking to a different transaction does not re-inherit its tax rate.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingItem] if the item does not exist,
/// - [Error::InvalidTransactionLink] if the new transaction does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_item(
    account_id: &str,
    item_id: ItemId,
    edit: &ItemEdit,
    connection: &Connection,
) -> Result<Item, Error> {
    if let Some(transaction_id) = &edit.transaction_id {
        linked_transaction_tax_rate(account_id, transaction_id, connection)?;
    }

    let rows_affected = connection.execute(
        "UPDATE item
        SET \
            transaction_id = ?1, \
            description = ?2, \
            purchase_price = ?3, \
            project_price = ?4, \
            tax_rate_pct = ?5 \
        WHERE id = ?6 AND account_id = ?7;",
        params![
            edit.transaction_id,
            edit.description,
            edit.purchase_price.map(|value| value.to_string()),
            edit.project_price.map(|value| value.to_string()),
            edit.tax_rate_pct.map(|value| value.to_string()),
            item_id,
            account_id,
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingItem);
    }

    get_item(account_id, item_id, connection)
}

/// Link an item to `transaction_id` (or unlink it with `None`) and record the
/// project it now belongs to.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingItem] if the item does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn set_item_link(
    account_id: &str,
    item_id: ItemId,
    transaction_id: Option<&str>,
    project_id: Option<&str>,
    connection: &Connection,
) -> Result<Item, Error> {
    let rows_affected = connection.execute(
        "UPDATE item SET transaction_id = ?1, project_id = ?2 WHERE id = ?3 AND account_id = ?4",
        params![transaction_id, project_id, item_id, account_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingItem);
    }

    get_item(account_id, item_id, connection)
}

/// Delete an item by ID and return the deleted item.
///
/// # Errors
/// Returns [Error::DeleteMissingItem] if the item doesn't exist.
pub fn delete_item(account_id: &str, item_id: ItemId, connection: &Connection) -> Result<Item, Error> {
    connection
        .prepare(&format!(
            "DELETE FROM item WHERE id = ?1 AND account_id = ?2 RETURNING {ITEM_COLUMNS}"
        ))?
        .query_row(params![item_id, account_id], map_item_row)
        .optional()?
        .ok_or(Error::DeleteMissingItem)
}

/// Initialize the item table and indexes.
pub fn create_item_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            project_id TEXT,
            transaction_id TEXT,
            description TEXT NOT NULL,
            purchase_price TEXT,
            project_price TEXT,
            tax_rate_pct TEXT,
            FOREIGN KEY(account_id, transaction_id) REFERENCES \"transaction\"(account_id, id) ON UPDATE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_item_account_transaction ON item(account_id, transaction_id);",
    )?;

    Ok(())
}

fn map_item_row(row: &Row) -> Result<Item, rusqlite::Error> {
    let id = row.get(0)?;
    let account_id = row.get(1)?;
    let project_id = row.get(2)?;
    let transaction_id = row.get(3)?;
    let description = row.get(4)?;
    let purchase_price = optional_decimal_from_sql(row.get(5)?, 5)?;
    let project_price = optional_decimal_from_sql(row.get(6)?, 6)?;
    let tax_rate_pct = optional_decimal_from_sql(row.get(7)?, 7)?;

    Ok(Item {
        id,
        account_id,
        project_id,
        transaction_id,
        description,
        purchase_price,
        project_price,
        tax_rate_pct,
    })
}

#[cfg(test)]
mod item_query_tests {
    use rusqlite::Connection;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        item::{
            ItemEdit, NewItem, create_item, delete_item, get_item, get_items_for_transaction,
            linked_items_total, set_item_link, update_item,
        },
        transaction::{Transaction, TransactionEdit, create_transaction, update_transaction},
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        connection
    }

    fn create_test_transaction(connection: &Connection, id: &str) {
        create_transaction(
            Transaction::build(id, "acme", dec!(100.00), date!(2025 - 03 - 01))
                .tax_rate_pct(Some(dec!(8.875))),
            connection,
        )
        .expect("Could not create test transaction");
    }

    #[test]
    fn create_item_succeeds() {
        let connection = get_test_connection();

        let item = create_item(
            NewItem::new("acme", "Walnut side table").project_price(Some(dec!(450.00))),
            &connection,
        )
        .expect("Could not create item");

        assert!(item.id > 0);
        assert_eq!(item.project_price, Some(dec!(450.00)));
        assert_eq!(item.transaction_id, None);
    }

    #[test]
    fn create_item_inherits_transaction_tax_rate() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");

        let item = create_item(
            NewItem::new("acme", "Lamp").transaction_id(Some("txn-1")),
            &connection,
        )
        .unwrap();

        assert_eq!(item.tax_rate_pct, Some(dec!(8.875)));
    }

    #[test]
    fn explicit_tax_rate_is_not_overridden() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");

        let item = create_item(
            NewItem::new("acme", "Lamp")
                .transaction_id(Some("txn-1"))
                .tax_rate_pct(Some(dec!(0))),
            &connection,
        )
        .unwrap();

        assert_eq!(item.tax_rate_pct, Some(dec!(0)));
    }

    #[test]
    fn inherited_tax_rate_survives_transaction_rate_change() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");
        let item = create_item(
            NewItem::new("acme", "Lamp").transaction_id(Some("txn-1")),
            &connection,
        )
        .unwrap();

        update_transaction(
            "acme",
            "txn-1",
            &TransactionEdit {
                amount: dec!(100.00),
                date: date!(2025 - 03 - 01),
                description: String::new(),
                subtotal: None,
                tax_rate_pct: Some(dec!(5.0)),
                tax_total: None,
            },
            &connection,
        )
        .unwrap();

        let item = get_item("acme", item.id, &connection).unwrap();
        assert_eq!(item.tax_rate_pct, Some(dec!(8.875)));
    }

    #[test]
    fn create_item_with_unknown_transaction_fails() {
        let connection = get_test_connection();

        let result = create_item(
            NewItem::new("acme", "Lamp").transaction_id(Some("missing")),
            &connection,
        );

        assert_eq!(
            result,
            Err(Error::InvalidTransactionLink("missing".to_owned()))
        );
    }

    #[test]
    fn create_item_cannot_link_to_other_accounts_transaction() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");

        let result = create_item(
            NewItem::new("someone-else", "Lamp").transaction_id(Some("txn-1")),
            &connection,
        );

        assert_eq!(result, Err(Error::InvalidTransactionLink("txn-1".to_owned())));
    }

    #[test]
    fn get_items_for_transaction_only_returns_linked_items() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");
        let linked = create_item(
            NewItem::new("acme", "Rug").transaction_id(Some("txn-1")),
            &connection,
        )
        .unwrap();
        create_item(NewItem::new("acme", "Unlinked"), &connection).unwrap();

        let items = get_items_for_transaction("acme", "txn-1", &connection).unwrap();

        assert_eq!(items, vec![linked]);
    }

    #[test]
    fn linked_items_total_skips_unpriced_items() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");
        for price in [Some(dec!(250.10)), None, Some(dec!(249.90))] {
            create_item(
                NewItem::new("acme", "Chair")
                    .transaction_id(Some("txn-1"))
                    .project_price(price),
                &connection,
            )
            .unwrap();
        }

        let total = linked_items_total("acme", "txn-1", &connection).unwrap();

        assert_eq!(total, dec!(500.00));
    }

    #[test]
    fn linked_items_total_saturates() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");
        for _ in 0..2 {
            create_item(
                NewItem::new("acme", "Chandelier")
                    .transaction_id(Some("txn-1"))
                    .project_price(Some(Decimal::MAX)),
                &connection,
            )
            .unwrap();
        }

        let total = linked_items_total("acme", "txn-1", &connection).unwrap();

        assert_eq!(total, Decimal::MAX);
    }

    #[test]
    fn same_transaction_id_in_two_accounts_is_allowed() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");
        create_transaction(
            Transaction::build("txn-1", "globex", dec!(20.00), date!(2025 - 03 - 01)),
            &connection,
        )
        .expect("Could not create transaction for second account");

        let item = create_item(
            NewItem::new("globex", "Stool")
                .transaction_id(Some("txn-1"))
                .project_price(Some(dec!(20.00))),
            &connection,
        )
        .unwrap();

        assert_eq!(
            get_items_for_transaction("globex", "txn-1", &connection).unwrap(),
            vec![item]
        );
        assert!(get_items_for_transaction("acme", "txn-1", &connection)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn update_item_succeeds() {
        let connection = get_test_connection();
        let item = create_item(NewItem::new("acme", "Chair"), &connection).unwrap();

        let mut edit = ItemEdit::from(&item);
        edit.project_price = Some(dec!(120));
        let updated = update_item("acme", item.id, &edit, &connection).unwrap();

        assert_eq!(updated.project_price, Some(dec!(120)));
    }

    #[test]
    fn update_missing_item_fails() {
        let connection = get_test_connection();
        let edit = ItemEdit {
            transaction_id: None,
            description: String::new(),
            purchase_price: None,
            project_price: None,
            tax_rate_pct: None,
        };

        assert_eq!(
            update_item("acme", 999, &edit, &connection),
            Err(Error::UpdateMissingItem)
        );
    }

    #[test]
    fn set_item_link_moves_item() {
        let connection = get_test_connection();
        create_test_transaction(&connection, "txn-1");
        let item = create_item(NewItem::new("acme", "Chair"), &connection).unwrap();

        let linked =
            set_item_link("acme", item.id, Some("txn-1"), Some("kitchen"), &connection).unwrap();

        assert_eq!(linked.transaction_id.as_deref(), Some("txn-1"));
        assert_eq!(linked.project_id.as_deref(), Some("kitchen"));
    }

    #[test]
    fn delete_item_returns_deleted_item() {
        let connection = get_test_connection();
        let item = create_item(NewItem::new("acme", "Chair"), &connection).unwrap();

        let deleted = delete_item("acme", item.id, &connection);

        assert_eq!(deleted, Ok(item.clone()));
        assert_eq!(get_item("acme", item.id, &connection), Err(Error::NotFound));
    }

    #[test]
    fn delete_missing_item_fails() {
        let connection = get_test_connection();

        assert_eq!(
            delete_item("acme", 42, &connection),
            Err(Error::DeleteMissingItem)
        );
    }
}
