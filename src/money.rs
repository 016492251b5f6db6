//! Currency helpers shared by the tax inference and completeness calculations.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// The number of decimal places money is rounded to.
pub const CURRENCY_DECIMAL_PLACES: u32 = 2;

/// Round `value` to whole cents, rounding midpoints away from zero (half-up).
///
/// Every cent-level rounding in the crate goes through this function so that
/// subtotals, tax amounts and canonical transaction totals agree with each other.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(
        CURRENCY_DECIMAL_PLACES,
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// Parse a decimal string read from the database.
pub(crate) fn decimal_from_sql(text: &str, column: usize) -> Result<Decimal, rusqlite::Error> {
    Decimal::from_str(text.trim()).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
    })
}

/// Parse an optional decimal column read from the database.
pub(crate) fn optional_decimal_from_sql(
    text: Option<String>,
    column: usize,
) -> Result<Option<Decimal>, rusqlite::Error> {
    text.map(|text| decimal_from_sql(&text, column)).transpose()
}

#[cfg(test)]
mod round_currency_tests {
    use rust_decimal_macros::dec;

    use super::round_currency;

    #[test]
    fn rounds_half_cent_up() {
        assert_eq!(round_currency(dec!(0.005)), dec!(0.01));
        assert_eq!(round_currency(dec!(1.005)), dec!(1.01));
        assert_eq!(round_currency(dec!(8.875)), dec!(8.88));
    }

    #[test]
    fn rounds_below_half_cent_down() {
        assert_eq!(round_currency(dec!(0.004)), dec!(0.00));
        assert_eq!(round_currency(dec!(2.6749)), dec!(2.67));
    }

    #[test]
    fn rounds_negative_midpoint_away_from_zero() {
        assert_eq!(round_currency(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn leaves_whole_cents_untouched() {
        assert_eq!(round_currency(dec!(725.00)), dec!(725.00));
    }
}
