//! Inventory items and the queries that link them to transactions.

mod db;
mod domain;
mod endpoints;
mod service;

pub use db::{
    create_item, create_item_table, delete_item, get_item, get_items_for_transaction,
    linked_items_total, set_item_link, update_item,
};
pub use domain::{Item, ItemEdit, NewItem};
pub use endpoints::{ItemRequest, create_item_endpoint, delete_item_endpoint, update_item_endpoint};
