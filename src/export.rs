//! CSV projections of the portfolio and allocation breakdown
//!
//! Pure row projections plus csv-crate serialization. Actual file writing
//! is the caller's responsibility; these functions only produce bytes.
//! Fields are quoted only when they contain a comma, quote or newline, and
//! numeric fields are written unquoted.

use chrono::NaiveDate;

use crate::currency;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::models::{AllocationResult, CurrencyEntry, Mapping};

pub const PORTFOLIO_HEADER: [&str; 9] = [
    "Brokerage",
    "Account ID",
    "Account Name",
    "Symbol",
    "Value",
    "Currency",
    "Currency Multiplier",
    "Normalized Value",
    "Category",
];

pub const ALLOCATIONS_HEADER: [&str; 3] = ["Category", "Value", "% Portfolio"];

/// One row per position: account fields are empty for a flat ledger, the
/// multiplier and category are empty when unresolved, and the normalized
/// value falls back to the raw value when no rate is defined.
pub fn portfolio_rows(
    ledger: &Ledger,
    currencies: &[CurrencyEntry],
    mappings: &[Mapping],
) -> Vec<Vec<String>> {
    let row = |brokerage: &str, id: &str, name: &str, position: &crate::models::Position| {
        let multiplier = position
            .currency
            .as_deref()
            .and_then(|code| currency::find_multiplier(code, currencies));
        let normalized =
            currency::convert(position.value, position.currency.as_deref(), currencies);
        let category = mappings
            .iter()
            .find(|m| m.symbol == position.symbol)
            .and_then(|m| m.category.clone())
            .unwrap_or_default();
        vec![
            brokerage.to_string(),
            id.to_string(),
            name.to_string(),
            position.symbol.clone(),
            position.value.normalize().to_string(),
            position.currency.clone().unwrap_or_default(),
            multiplier.map(|m| m.normalize().to_string()).unwrap_or_default(),
            normalized.normalize().to_string(),
            category,
        ]
    };

    match ledger {
        Ledger::Accounts(accounts) => accounts
            .iter()
            .flat_map(|a| {
                a.positions
                    .iter()
                    .map(|p| row(&a.brokerage, &a.id, &a.name, p))
            })
            .collect(),
        Ledger::Positions(positions) => positions.iter().map(|p| row("", "", "", p)).collect(),
    }
}

/// One row per category. The percentage column is empty when the portfolio
/// total is zero.
pub fn allocation_rows(result: &AllocationResult) -> Vec<Vec<String>> {
    result
        .items
        .iter()
        .map(|a| {
            vec![
                a.category.clone(),
                a.value.normalize().to_string(),
                a.percentage
                    .map(|p| p.normalize().to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect()
}

/// Serialize the portfolio projection, header row first.
pub fn portfolio_csv(
    ledger: &Ledger,
    currencies: &[CurrencyEntry],
    mappings: &[Mapping],
) -> Result<String> {
    to_csv(&PORTFOLIO_HEADER, portfolio_rows(ledger, currencies, mappings))
}

/// Serialize the allocation projection, header row first.
pub fn allocations_csv(result: &AllocationResult) -> Result<String> {
    to_csv(&ALLOCATIONS_HEADER, allocation_rows(result))
}

fn to_csv(header: &[&str], rows: Vec<Vec<String>>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}

/// Default export filename, e.g. `2026-08-27 portfolio.csv`.
pub fn portfolio_filename(date: NaiveDate) -> String {
    format!("{} portfolio.csv", date.format("%Y-%m-%d"))
}

/// Default export filename, e.g. `2026-08-27 allocations.csv`.
pub fn allocations_filename(date: NaiveDate) -> String {
    format!("{} allocations.csv", date.format("%Y-%m-%d"))
}
