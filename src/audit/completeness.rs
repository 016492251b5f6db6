//! Checks whether a transaction's linked items add up to what was paid.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::{
    audit::tax::{SubtotalSource, infer_subtotal},
    item::Item,
    money::round_currency,
    transaction::Transaction,
};

/// Ratios at or above this are at least `near`.
const NEAR_LOWER_BOUND: Decimal = dec!(0.8);
/// Ratios at or above this are `complete`.
const COMPLETE_LOWER_BOUND: Decimal = dec!(0.9);
/// Ratios strictly above this are `over`.
///
/// Ratios between 1.1 and 1.2 inclusive are a tolerated overage and count as
/// `complete`.
const OVER_THRESHOLD: Decimal = dec!(1.2);

/// Decimal places kept on the reported ratio.
const RATIO_DECIMAL_PLACES: u32 = 4;

/// How well the items linked to a transaction reconcile against its subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletenessStatus {
    /// Item total is within 0.9–1.2 of the subtotal.
    Complete,
    /// Item total is within 0.8–0.9 of the subtotal.
    Near,
    /// Item total is under 0.8 of the subtotal.
    Incomplete,
    /// Item total is over 1.2 of the subtotal.
    Over,
}

/// A point-in-time audit of a transaction against its linked items.
///
/// Snapshots are never stored, only [CompletenessSnapshot::needs_review] is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletenessSnapshot {
    /// The total of the usable prices of the linked items.
    pub items_net_total: Decimal,
    /// How many linked items have no usable price.
    pub items_missing_price_count: usize,
    /// The pre-tax subtotal the items are compared against.
    pub transaction_subtotal: Decimal,
    /// Where `transaction_subtotal` came from.
    pub subtotal_source: SubtotalSource,
    /// `items_net_total - transaction_subtotal`.
    pub variance: Decimal,
    /// `items_net_total / transaction_subtotal`, rounded to 4 decimal places.
    pub completeness_ratio: Decimal,
    /// The band `completeness_ratio` falls in.
    pub completeness_status: CompletenessStatus,
    /// Neither a subtotal nor any tax data was recorded, the ratio is
    /// measured against the gross amount and is advisory only.
    pub missing_tax_data: bool,
}

impl CompletenessSnapshot {
    /// Whether the transaction should be flagged for review.
    pub fn needs_review(&self) -> bool {
        self.completeness_status != CompletenessStatus::Complete
    }
}

/// Compute the completeness of `transaction` given the `items` linked to it.
///
/// This is a pure function: it never fails and gives the same answer for the
/// same inputs. Items without a usable price add nothing to the total and are
/// counted in `items_missing_price_count`.
///
/// Totals that do not fit in a [Decimal] saturate instead of overflowing, so
/// absurd prices classify as `over` rather than failing.
pub fn calculate_completeness(transaction: &Transaction, items: &[Item]) -> CompletenessSnapshot {
    let inference = infer_subtotal(transaction);

    let (net_total, items_missing_price_count) =
        items
            .iter()
            .fold((Decimal::ZERO, 0), |(total, missing), item| {
                match item.usable_price() {
                    Some(price) => (total.saturating_add(price), missing),
                    None => (total, missing + 1),
                }
            });
    let items_net_total = round_currency(net_total);
    let subtotal = inference.subtotal;

    // Returns may be recorded as negative amounts, so compare magnitudes.
    let (ratio, completeness_status) = if items.is_empty() {
        // With no subtotal to reconcile against there is nothing to flag.
        if subtotal.is_zero() || inference.missing_tax_data {
            (Decimal::ZERO, CompletenessStatus::Complete)
        } else {
            (Decimal::ZERO, CompletenessStatus::Incomplete)
        }
    } else if subtotal.is_zero() {
        if items_net_total.is_zero() {
            (Decimal::ZERO, CompletenessStatus::Complete)
        } else {
            (Decimal::ZERO, CompletenessStatus::Over)
        }
    } else {
        let ratio = items_net_total
            .abs()
            .checked_div(subtotal.abs())
            .unwrap_or(Decimal::MAX);
        (ratio, classify_ratio(ratio))
    };

    CompletenessSnapshot {
        items_net_total,
        items_missing_price_count,
        transaction_subtotal: subtotal,
        subtotal_source: inference.source,
        variance: items_net_total.saturating_sub(subtotal),
        completeness_ratio: ratio
            .round_dp_with_strategy(RATIO_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero),
        completeness_status,
        missing_tax_data: inference.missing_tax_data,
    }
}

/// Map an item-total-to-subtotal ratio onto a status band.
pub fn classify_ratio(ratio: Decimal) -> CompletenessStatus {
    if ratio > OVER_THRESHOLD {
        CompletenessStatus::Over
    } else if ratio >= COMPLETE_LOWER_BOUND {
        CompletenessStatus::Complete
    } else if ratio >= NEAR_LOWER_BOUND {
        CompletenessStatus::Near
    } else {
        CompletenessStatus::Incomplete
    }
}
