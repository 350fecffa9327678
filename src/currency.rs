//! Currency normalization
//!
//! Converts a position's brokerage-reported value into the base currency
//! using the user-maintained conversion table. The convention is
//! `normalized = value * multiplier`, where `multiplier` is the amount of
//! base currency equivalent to 1 unit of the foreign currency; the base
//! currency's own multiplier is implicitly 1.

use rust_decimal::Decimal;

use crate::models::CurrencyEntry;

/// Uppercase a currency code for storage and comparison.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Look up a defined multiplier for `code`, case-insensitively.
pub fn find_multiplier(code: &str, table: &[CurrencyEntry]) -> Option<Decimal> {
    table
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(code))
        .and_then(|c| c.multiplier)
}

/// Convert `value` into the base currency.
///
/// A position without a currency, or with a currency that has no defined
/// multiplier, passes through unconverted. That is a deliberate
/// degrade-gracefully policy: the value is treated as already being in the
/// base currency until the user provides a rate.
pub fn convert(value: Decimal, currency: Option<&str>, table: &[CurrencyEntry]) -> Decimal {
    match currency.and_then(|code| find_multiplier(code, table)) {
        Some(multiplier) => value * multiplier,
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table() -> Vec<CurrencyEntry> {
        vec![
            CurrencyEntry {
                code: "USD".to_string(),
                multiplier: Some(dec!(1.35)),
            },
            CurrencyEntry::unresolved("GBP"),
        ]
    }

    #[test]
    fn test_convert_applies_multiplier() {
        assert_eq!(convert(dec!(100), Some("USD"), &table()), dec!(135.00));
    }

    #[test]
    fn test_convert_is_case_insensitive() {
        assert_eq!(convert(dec!(100), Some("usd"), &table()), dec!(135.00));
    }

    #[test]
    fn test_convert_passes_through_on_missing_rate() {
        // GBP exists but has no multiplier yet; CAD is absent entirely.
        assert_eq!(convert(dec!(100), Some("GBP"), &table()), dec!(100));
        assert_eq!(convert(dec!(100), Some("CAD"), &table()), dec!(100));
    }

    #[test]
    fn test_convert_passes_through_on_unknown_currency() {
        assert_eq!(convert(dec!(100), None, &table()), dec!(100));
        assert_eq!(convert(dec!(100), Some("USD"), &[]), dec!(100));
    }

    #[test]
    fn test_convert_negative_value() {
        assert_eq!(convert(dec!(-50), Some("USD"), &table()), dec!(-67.50));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" usd "), "USD");
    }
}
