//! Application router configuration.

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    AppState,
    allocation::{allocate_items_endpoint, deallocate_item_endpoint},
    endpoints,
    item::{create_item_endpoint, delete_item_endpoint, update_item_endpoint},
    transaction::{
        create_items_endpoint, create_transaction_endpoint, edit_transaction_endpoint,
        get_completeness_endpoint, get_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::TRANSACTIONS, post(create_transaction_endpoint))
        .route(
            endpoints::TRANSACTION,
            get(get_transaction_endpoint).put(edit_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION_COMPLETENESS,
            get(get_completeness_endpoint),
        )
        .route(endpoints::TRANSACTION_ITEMS, post(create_items_endpoint))
        .route(endpoints::ITEMS, post(create_item_endpoint))
        .route(
            endpoints::ITEM,
            axum::routing::put(update_item_endpoint).delete(delete_item_endpoint),
        )
        .route(
            endpoints::ITEM_ALLOCATION,
            axum::routing::delete(deallocate_item_endpoint),
        )
        .route(
            endpoints::PROJECT_ALLOCATIONS,
            post(allocate_items_endpoint),
        )
        .fallback(get_404_not_found)
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(json!({ "error": "no route matches the requested path" })),
    )
        .into_response()
}
