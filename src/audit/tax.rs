//! Derives a pre-tax subtotal for transactions that did not record one.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{money::round_currency, transaction::Transaction};

/// Where an inferred subtotal came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtotalSource {
    /// The subtotal stored on the transaction.
    Stored,
    /// `amount - tax_total`.
    TaxTotal,
    /// `amount - round(amount * tax_rate_pct / 100)`.
    TaxRate,
    /// No tax data, the gross amount is used as is.
    GrossAmount,
}

/// The best-effort pre-tax subtotal of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubtotalInference {
    /// The inferred subtotal, rounded to cents.
    pub subtotal: Decimal,
    /// Which rule produced `subtotal`.
    pub source: SubtotalSource,
    /// True when neither a stored subtotal nor any tax data was available, so
    /// any ratio against `subtotal` is advisory only.
    pub missing_tax_data: bool,
}

/// Infer the pre-tax subtotal from the fields recorded on a transaction.
///
/// See [infer_subtotal_from_parts] for the priority rules.
pub fn infer_subtotal(transaction: &Transaction) -> SubtotalInference {
    infer_subtotal_from_parts(
        transaction.amount,
        transaction.subtotal,
        transaction.tax_rate_pct,
        transaction.tax_total,
    )
}

/// Infer a pre-tax subtotal.
///
/// Priority: the stored subtotal, then `amount - tax_total`, then
/// `amount - round(amount * tax_rate_pct / 100, 2)`, and finally the gross
/// `amount` flagged with `missing_tax_data`. Results that do not fit in a
/// [Decimal] saturate.
pub fn infer_subtotal_from_parts(
    amount: Decimal,
    subtotal: Option<Decimal>,
    tax_rate_pct: Option<Decimal>,
    tax_total: Option<Decimal>,
) -> SubtotalInference {
    if let Some(subtotal) = subtotal {
        return SubtotalInference {
            subtotal: round_currency(subtotal),
            source: SubtotalSource::Stored,
            missing_tax_data: false,
        };
    }

    if let Some(tax_total) = tax_total {
        return SubtotalInference {
            subtotal: round_currency(amount.saturating_sub(tax_total)),
            source: SubtotalSource::TaxTotal,
            missing_tax_data: false,
        };
    }

    if let Some(rate) = tax_rate_pct {
        let tax = round_currency(amount.saturating_mul(rate / Decimal::ONE_HUNDRED));

        return SubtotalInference {
            subtotal: round_currency(amount.saturating_sub(tax)),
            source: SubtotalSource::TaxRate,
            missing_tax_data: false,
        };
    }

    SubtotalInference {
        subtotal: round_currency(amount),
        source: SubtotalSource::GrossAmount,
        missing_tax_data: true,
    }
}
