//! Core data model shared across the engine
//!
//! Positions are recorded exactly as the brokerage reported them and are
//! replaced wholesale on re-sync, never mutated in place. Currency entries
//! and mappings are derived-but-persisted: their existence set follows the
//! ledger, while user-entered multipliers and categories are authoritative.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// A single brokerage holding: ticker symbol, market value, optional currency.
///
/// Some scrapers cannot determine the currency (e.g. when the column is not
/// displayed), so `currency` stays `None` until the user fixes the page and
/// re-syncs. Values that fail to parse are recorded as zero rather than
/// rejecting the whole snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl Position {
    /// Uppercase the symbol and currency code so lookups are unambiguous.
    pub fn normalize(mut self) -> Self {
        self.symbol = self.symbol.trim().to_uppercase();
        self.currency = self
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty());
        self
    }
}

/// A brokerage account recorded in the ledger.
///
/// `id` is the brokerage-prefixed unique key (e.g. `questrade:Margin`).
/// `hidden` collapses the account in listings; its positions still count
/// toward allocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brokerage: String,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub hidden: bool,
}

/// Currency code with an optional user-entered rate into the base currency.
///
/// `multiplier` is the amount of base currency equivalent to 1 unit of
/// `code`. `None` means the user has not provided a rate yet; such entries
/// are excluded from conversion and from persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrencyEntry {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<Decimal>,
}

impl CurrencyEntry {
    pub fn unresolved(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            multiplier: None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.multiplier.is_some()
    }
}

/// User-defined symbol-to-category classification.
///
/// Auto-created as unresolved when a new symbol appears in the ledger;
/// excluded from persistence until the user fills in `category`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mapping {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Mapping {
    pub fn unresolved(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            category: None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.category.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Aggregated value and portfolio share for one category.
///
/// `percentage` is on the 0-100 scale and is `None` when the portfolio
/// total is zero (empty or all-zero ledger).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub category: String,
    pub value: Decimal,
    pub percentage: Option<Decimal>,
}

/// Full allocation breakdown, items sorted by value descending.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationResult {
    pub items: Vec<Allocation>,
    pub total: Decimal,
}

/// Deserialize a market value leniently: numbers pass through, numeric
/// strings (with thousands separators) are parsed, anything else becomes
/// zero. A single malformed position must not abort the whole snapshot.
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(serde_json::Value::String(s)) => parse_decimal(&s.replace(',', "")),
        _ => Decimal::ZERO,
    })
}

fn parse_decimal(s: &str) -> Decimal {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .unwrap_or(Decimal::ZERO)
}
