//! The API endpoints URIs.
//!
//! Every route is scoped to a business account. For endpoints that take
//! parameters, e.g., '/api/accounts/{account_id}/items/{item_id}', use
//! [format_endpoint].

/// The route to create transactions.
pub const TRANSACTIONS: &str = "/api/accounts/{account_id}/transactions";
/// The route to get or edit a single transaction.
pub const TRANSACTION: &str = "/api/accounts/{account_id}/transactions/{transaction_id}";
/// The route for the completeness of a transaction's items.
pub const TRANSACTION_COMPLETENESS: &str =
    "/api/accounts/{account_id}/transactions/{transaction_id}/completeness";
/// The route to add several items to a transaction at once.
pub const TRANSACTION_ITEMS: &str =
    "/api/accounts/{account_id}/transactions/{transaction_id}/items";
/// The route to create items.
pub const ITEMS: &str = "/api/accounts/{account_id}/items";
/// The route to update or delete a single item.
pub const ITEM: &str = "/api/accounts/{account_id}/items/{item_id}";
/// The route to return an item from its project.
pub const ITEM_ALLOCATION: &str = "/api/accounts/{account_id}/items/{item_id}/allocation";
/// The route to allocate items into a project.
pub const PROJECT_ALLOCATIONS: &str = "/api/accounts/{account_id}/projects/{project_id}/allocations";

/// Replace the parameters in `endpoint_path` with `values`, in order.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// Parameters without a matching value are left in place, extra values are
/// ignored.
pub fn format_endpoint(endpoint_path: &str, values: &[&str]) -> String {
    let mut formatted = String::with_capacity(endpoint_path.len());
    let mut remaining = endpoint_path;
    let mut values = values.iter();

    while let Some(param_start) = remaining.find('{') {
        let Some(param_len) = remaining[param_start..].find('}') else {
            break;
        };
        let Some(value) = values.next() else {
            break;
        };

        formatted.push_str(&remaining[..param_start]);
        formatted.push_str(value);
        remaining = &remaining[param_start + param_len + 1..];
    }

    formatted.push_str(remaining);
    formatted
}
