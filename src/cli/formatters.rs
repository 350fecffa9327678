//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of data calculation from presentation.

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::ledger::Ledger;
use crate::models::{AllocationResult, CurrencyEntry, Mapping, Position};

/// Shown in place of a value the user has not entered yet.
const UNRESOLVED: &str = "???";

/// Format the allocation breakdown for terminal table output.
pub fn format_allocations_table(result: &AllocationResult, base_currency: &str) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{} Portfolio Allocation ({})\n\n",
        "📊".cyan().bold(),
        base_currency
    ));

    if result.items.is_empty() {
        output.push_str("No positions tracked yet. Run `pinsight ingest` first.\n");
        return output;
    }

    #[derive(Tabled)]
    struct AllocationRow {
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "% Portfolio")]
        percentage: String,
    }

    let rows: Vec<AllocationRow> = result
        .items
        .iter()
        .map(|item| AllocationRow {
            category: item.category.clone(),
            value: format!("{:.2}", item.value),
            percentage: item
                .percentage
                .map(|p| format!("{:.1}%", p))
                .unwrap_or_else(|| "N/A".to_string()),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    output.push_str(&table);
    output.push_str(&format!(
        "\n\nTotal: {}\n",
        format!("{:.2} {}", result.total, base_currency).bold()
    ));
    output
}

/// Format the account list, marking hidden accounts.
pub fn format_accounts_table(ledger: &Ledger) -> String {
    let accounts = ledger.accounts();
    if accounts.is_empty() {
        return "No accounts tracked yet.\n".to_string();
    }

    #[derive(Tabled)]
    struct AccountRow {
        #[tabled(rename = "Brokerage")]
        brokerage: String,
        #[tabled(rename = "Account ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Positions")]
        positions: usize,
        #[tabled(rename = "Hidden")]
        hidden: String,
    }

    let rows: Vec<AccountRow> = accounts
        .iter()
        .map(|a| AccountRow {
            brokerage: a.brokerage.clone(),
            id: a.id.clone(),
            name: a.name.clone(),
            positions: a.positions.len(),
            hidden: if a.hidden { "yes".yellow().to_string() } else { String::new() },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a position preview for snapshot ingestion.
pub fn format_positions_table(positions: &[Position]) -> String {
    #[derive(Tabled)]
    struct PositionRow {
        #[tabled(rename = "Symbol")]
        symbol: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Currency")]
        currency: String,
    }

    let rows: Vec<PositionRow> = positions
        .iter()
        .map(|p| PositionRow {
            symbol: p.symbol.clone(),
            value: format!("{:.2}", p.value),
            currency: p.currency.clone().unwrap_or_default(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the currency conversion table. Unresolved entries show `???`
/// until the user supplies a multiplier.
pub fn format_currencies_table(entries: &[CurrencyEntry]) -> String {
    if entries.is_empty() {
        return "No currencies tracked yet.\n".to_string();
    }

    #[derive(Tabled)]
    struct CurrencyRow {
        #[tabled(rename = "Code")]
        code: String,
        #[tabled(rename = "Multiplier")]
        multiplier: String,
    }

    let rows: Vec<CurrencyRow> = entries
        .iter()
        .map(|c| CurrencyRow {
            code: c.code.clone(),
            multiplier: c
                .multiplier
                .map(|m| m.normalize().to_string())
                .unwrap_or_else(|| UNRESOLVED.red().to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the symbol-category mapping table.
pub fn format_mappings_table(mappings: &[Mapping]) -> String {
    if mappings.is_empty() {
        return "No mappings tracked yet.\n".to_string();
    }

    #[derive(Tabled)]
    struct MappingRow {
        #[tabled(rename = "Symbol")]
        symbol: String,
        #[tabled(rename = "Category")]
        category: String,
    }

    let rows: Vec<MappingRow> = mappings
        .iter()
        .map(|m| MappingRow {
            symbol: m.symbol.clone(),
            category: match m.category.as_deref() {
                Some(category) if !category.is_empty() => category.to_string(),
                _ => UNRESOLVED.red().to_string(),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}
