//! Allocation engine
//!
//! Computes the category allocation breakdown from the ledger and the
//! user-maintained tables. The result is recomputed wholesale on every
//! input change; there is no incremental or cached state.

use rust_decimal::Decimal;

use crate::currency;
use crate::ledger::Ledger;
use crate::models::{Allocation, AllocationResult, CurrencyEntry, Mapping};

/// Category assigned to positions whose symbol has no mapping yet.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Compute per-category normalized totals, the grand total and percentages.
///
/// Positions are flattened in ledger order and grouped by resolved category
/// in first-seen order. Each position's value is converted into the base
/// currency before summing; a missing rate passes the value through
/// unchanged. Categories are then sorted by value descending; ties keep
/// their first-seen relative order. Percentages are on the 0-100 scale and
/// are `None` when the grand total is zero, so an empty or all-zero ledger
/// produces an empty/zero result instead of an error.
pub fn compute_allocations(
    ledger: &Ledger,
    mappings: &[Mapping],
    currencies: &[CurrencyEntry],
) -> AllocationResult {
    let mut items: Vec<Allocation> = Vec::new();

    for position in ledger.positions() {
        let category = mappings
            .iter()
            .find(|m| m.symbol == position.symbol && m.is_defined())
            .and_then(|m| m.category.as_deref())
            .unwrap_or(UNCATEGORIZED);

        let normalized =
            currency::convert(position.value, position.currency.as_deref(), currencies);

        match items.iter_mut().find(|a| a.category == category) {
            Some(allocation) => allocation.value += normalized,
            None => items.push(Allocation {
                category: category.to_string(),
                value: normalized,
                percentage: None,
            }),
        }
    }

    let total: Decimal = items.iter().map(|a| a.value).sum();

    // sort_by is stable, so equal values keep first-seen order
    items.sort_by(|a, b| b.value.cmp(&a.value));

    if !total.is_zero() {
        for allocation in &mut items {
            allocation.percentage = Some(allocation.value / total * Decimal::ONE_HUNDRED);
        }
    }

    AllocationResult { items, total }
}
