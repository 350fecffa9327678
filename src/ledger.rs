//! Position ledger and reconciliation
//!
//! The ledger is the single source of truth for which symbols and currency
//! codes exist in the portfolio. Two product modes are supported: an
//! account-scoped ledger (one entry per brokerage account, upserted by id)
//! and a flat position ledger (deduplicated by symbol and currency).
//! Auxiliary tables (currency codes, symbol mappings) are derived from the
//! ledger's contents: missing entries are synthesized as unresolved
//! placeholders, and existing entries are never removed automatically so
//! user-entered rates and categories survive a re-sync.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, Result};
use crate::models::{Account, CurrencyEntry, Mapping, Position};

/// Which merge policy the ledger uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    /// Upsert whole accounts keyed by id (the account-scoped ledger).
    ByAccount,
    /// Sum values into matching (symbol, currency) rows (the flat ledger).
    ByPosition,
}

impl Default for MergeMode {
    fn default() -> Self {
        MergeMode::ByAccount
    }
}

/// Payload accepted into the ledger: a full scraped account, or bare
/// positions from the simpler product variant.
#[derive(Debug, Clone)]
pub enum SnapshotPayload {
    Account(Account),
    Positions(Vec<Position>),
}

/// The persisted position ledger, shaped by the product's merge mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ledger {
    Accounts(Vec<Account>),
    Positions(Vec<Position>),
}

impl Ledger {
    pub fn new(mode: MergeMode) -> Self {
        match mode {
            MergeMode::ByAccount => Ledger::Accounts(Vec::new()),
            MergeMode::ByPosition => Ledger::Positions(Vec::new()),
        }
    }

    pub fn mode(&self) -> MergeMode {
        match self {
            Ledger::Accounts(_) => MergeMode::ByAccount,
            Ledger::Positions(_) => MergeMode::ByPosition,
        }
    }

    /// Rehydrate from the stored `accounts` value. A missing key defaults
    /// to an empty ledger.
    pub fn from_value(mode: MergeMode, value: Option<serde_json::Value>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Ledger::new(mode));
        };
        match mode {
            MergeMode::ByAccount => {
                let accounts: Vec<Account> = serde_json::from_value(value)
                    .map_err(|e| PortfolioError::ParseError(format!("stored accounts: {e}")))?;
                Ok(Ledger::Accounts(accounts))
            }
            MergeMode::ByPosition => {
                let positions: Vec<Position> = serde_json::from_value(value)
                    .map_err(|e| PortfolioError::ParseError(format!("stored positions: {e}")))?;
                Ok(Ledger::Positions(positions))
            }
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            Ledger::Accounts(accounts) => serde_json::to_value(accounts)?,
            Ledger::Positions(positions) => serde_json::to_value(positions)?,
        };
        Ok(value)
    }

    /// All positions in ledger order: entry order, then position order
    /// within each entry. Hidden accounts are included; `hidden` is a
    /// display flag, not an exclusion.
    pub fn positions(&self) -> Box<dyn Iterator<Item = &Position> + '_> {
        match self {
            Ledger::Accounts(accounts) => {
                Box::new(accounts.iter().flat_map(|a| a.positions.iter()))
            }
            Ledger::Positions(positions) => Box::new(positions.iter()),
        }
    }

    pub fn accounts(&self) -> &[Account] {
        match self {
            Ledger::Accounts(accounts) => accounts,
            Ledger::Positions(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions().next().is_none()
    }

    pub fn position_count(&self) -> usize {
        self.positions().count()
    }

    /// Merge a freshly scraped payload into the ledger.
    ///
    /// An account payload arriving at a flat ledger is folded in by its
    /// positions. Bare positions cannot be merged into an account-scoped
    /// ledger because they carry no account identity.
    pub fn merge(&mut self, payload: SnapshotPayload) -> Result<()> {
        match (self, payload) {
            (Ledger::Accounts(accounts), SnapshotPayload::Account(incoming)) => {
                upsert_account(accounts, incoming);
                Ok(())
            }
            (Ledger::Positions(ledger), SnapshotPayload::Positions(incoming)) => {
                merge_positions(ledger, incoming);
                Ok(())
            }
            (Ledger::Positions(ledger), SnapshotPayload::Account(incoming)) => {
                merge_positions(ledger, incoming.positions);
                Ok(())
            }
            (Ledger::Accounts(_), SnapshotPayload::Positions(_)) => Err(
                PortfolioError::MergeModeMismatch(
                    "bare positions cannot be merged into an account-scoped ledger".to_string(),
                )
                .into(),
            ),
        }
    }

    /// Distinct currency codes across all positions, first-seen order.
    /// Positions without a currency are skipped.
    pub fn distinct_currency_codes(&self) -> Vec<String> {
        self.positions()
            .filter_map(|p| p.currency.as_deref())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .unique()
            .collect()
    }

    /// Distinct symbols across all positions, first-seen order.
    pub fn distinct_symbols(&self) -> Vec<String> {
        self.positions()
            .map(|p| p.symbol.clone())
            .unique()
            .collect()
    }
}

/// Replace-by-account merge: overwrite positions, name and brokerage of the
/// matching account, preserving its `hidden` flag and list position. New
/// accounts are inserted at the front (most recent first).
pub fn upsert_account(accounts: &mut Vec<Account>, incoming: Account) {
    match accounts.iter_mut().find(|a| a.id == incoming.id) {
        Some(existing) => {
            existing.name = incoming.name;
            existing.brokerage = incoming.brokerage;
            existing.positions = incoming.positions;
        }
        None => accounts.insert(0, incoming),
    }
}

/// Merge-by-position: add the incoming value into an existing row with the
/// same (symbol, currency), or append a new row. After the merge no
/// duplicate (symbol, currency) pairs remain, assuming none existed before.
pub fn merge_positions(ledger: &mut Vec<Position>, incoming: Vec<Position>) {
    for position in incoming {
        match ledger
            .iter_mut()
            .find(|p| p.symbol == position.symbol && p.currency == position.currency)
        {
            Some(existing) => existing.value += position.value,
            None => ledger.push(position),
        }
    }
}

/// Synthesize unresolved currency entries for codes that appear in the
/// ledger but not in the table. Existing entries are kept untouched, in
/// order, even when no position references them anymore.
pub fn derive_currency_entries(ledger: &Ledger, existing: &[CurrencyEntry]) -> Vec<CurrencyEntry> {
    let mut table = existing.to_vec();
    for code in ledger.distinct_currency_codes() {
        if !table.iter().any(|c| c.code.eq_ignore_ascii_case(&code)) {
            table.push(CurrencyEntry::unresolved(code));
        }
    }
    table
}

/// Synthesize unresolved mappings for symbols that appear in the ledger but
/// not in the table. Same never-remove policy as currency entries.
pub fn derive_mappings(ledger: &Ledger, existing: &[Mapping]) -> Vec<Mapping> {
    let mut table = existing.to_vec();
    for symbol in ledger.distinct_symbols() {
        if !table.iter().any(|m| m.symbol == symbol) {
            table.push(Mapping::unresolved(symbol));
        }
    }
    table
}

/// Explicit cleanup: drop currency entries no position references anymore.
/// This is only ever user-triggered; reconciliation never prunes.
pub fn prune_currency_entries(ledger: &Ledger, existing: &[CurrencyEntry]) -> Vec<CurrencyEntry> {
    let referenced = ledger.distinct_currency_codes();
    existing
        .iter()
        .filter(|c| referenced.iter().any(|r| c.code.eq_ignore_ascii_case(r)))
        .cloned()
        .collect()
}

/// Explicit cleanup: drop mappings no position references anymore.
pub fn prune_mappings(ledger: &Ledger, existing: &[Mapping]) -> Vec<Mapping> {
    let referenced = ledger.distinct_symbols();
    existing
        .iter()
        .filter(|m| referenced.contains(&m.symbol))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, value: rust_decimal::Decimal, currency: Option<&str>) -> Position {
        Position {
            symbol: symbol.to_string(),
            value,
            currency: currency.map(str::to_string),
        }
    }

    fn account(id: &str, positions: Vec<Position>) -> Account {
        Account {
            id: id.to_string(),
            name: id.to_string(),
            brokerage: "Questrade".to_string(),
            positions,
            hidden: false,
        }
    }

    #[test]
    fn test_upsert_account_prepends_new() {
        let mut accounts = vec![account("a", vec![])];
        upsert_account(&mut accounts, account("b", vec![]));
        assert_eq!(accounts[0].id, "b");
        assert_eq!(accounts[1].id, "a");
    }

    #[test]
    fn test_upsert_account_replaces_positions_and_preserves_hidden() {
        let mut accounts = vec![Account {
            hidden: true,
            ..account("a", vec![position("XIC", dec!(1), Some("CAD"))])
        }];
        upsert_account(
            &mut accounts,
            account("a", vec![position("VFV", dec!(2), Some("USD"))]),
        );
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].hidden);
        assert_eq!(accounts[0].positions.len(), 1);
        assert_eq!(accounts[0].positions[0].symbol, "VFV");
    }

    #[test]
    fn test_upsert_twice_leaves_single_entry() {
        let mut accounts = Vec::new();
        upsert_account(&mut accounts, account("a", vec![]));
        upsert_account(&mut accounts, account("a", vec![]));
        assert_eq!(accounts.len(), 1);
    }

    #[test]
    fn test_merge_positions_sums_matching_pairs() {
        let mut ledger = vec![position("XIC", dec!(100), Some("CAD"))];
        merge_positions(&mut ledger, vec![position("XIC", dec!(50), Some("CAD"))]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].value, dec!(150));
    }

    #[test]
    fn test_merge_positions_distinguishes_currency() {
        let mut ledger = vec![position("VFV", dec!(100), Some("CAD"))];
        merge_positions(&mut ledger, vec![position("VFV", dec!(100), Some("USD"))]);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_merge_same_snapshot_twice_doubles_values_not_rows() {
        let snapshot = vec![
            position("XIC", dec!(100), Some("CAD")),
            position("VFV", dec!(50), Some("USD")),
        ];
        let mut ledger = Vec::new();
        merge_positions(&mut ledger, snapshot.clone());
        let count_after_first = ledger.len();
        merge_positions(&mut ledger, snapshot);
        assert_eq!(ledger.len(), count_after_first);
        assert_eq!(ledger[0].value, dec!(200));
        assert_eq!(ledger[1].value, dec!(100));
    }

    #[test]
    fn test_merge_preserves_order_of_untouched_entries() {
        let mut ledger = vec![
            position("A", dec!(1), None),
            position("B", dec!(2), None),
            position("C", dec!(3), None),
        ];
        merge_positions(
            &mut ledger,
            vec![position("B", dec!(1), None), position("D", dec!(4), None)],
        );
        let symbols: Vec<_> = ledger.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, ["A", "B", "C", "D"]);
    }

    #[test]
    fn test_ledger_rejects_positions_into_account_mode() {
        let mut ledger = Ledger::new(MergeMode::ByAccount);
        let result = ledger.merge(SnapshotPayload::Positions(vec![]));
        assert!(result.is_err());
    }

    #[test]
    fn test_ledger_folds_account_into_flat_mode() {
        let mut ledger = Ledger::new(MergeMode::ByPosition);
        ledger
            .merge(SnapshotPayload::Account(account(
                "a",
                vec![position("XIC", dec!(100), Some("CAD"))],
            )))
            .unwrap();
        assert_eq!(ledger.position_count(), 1);
    }

    #[test]
    fn test_distinct_codes_first_seen_order_skips_missing() {
        let ledger = Ledger::Positions(vec![
            position("A", dec!(1), Some("USD")),
            position("B", dec!(1), None),
            position("C", dec!(1), Some("CAD")),
            position("D", dec!(1), Some("USD")),
        ]);
        assert_eq!(ledger.distinct_currency_codes(), ["USD", "CAD"]);
    }

    #[test]
    fn test_derive_currency_entries_appends_placeholders_only() {
        let ledger = Ledger::Positions(vec![
            position("A", dec!(1), Some("USD")),
            position("B", dec!(1), Some("CAD")),
        ]);
        let existing = vec![CurrencyEntry {
            code: "USD".to_string(),
            multiplier: Some(dec!(1.35)),
        }];
        let derived = derive_currency_entries(&ledger, &existing);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived[0].code, "USD");
        assert_eq!(derived[0].multiplier, Some(dec!(1.35)));
        assert_eq!(derived[1].code, "CAD");
        assert!(!derived[1].is_defined());
    }

    #[test]
    fn test_derive_keeps_unreferenced_entries() {
        let ledger = Ledger::Positions(vec![]);
        let existing = vec![CurrencyEntry {
            code: "EUR".to_string(),
            multiplier: Some(dec!(1.5)),
        }];
        let derived = derive_currency_entries(&ledger, &existing);
        assert_eq!(derived, existing);
    }

    #[test]
    fn test_derive_mappings_synthesizes_unresolved() {
        let ledger = Ledger::Positions(vec![position("ABC", dec!(1), None)]);
        let existing = vec![Mapping {
            symbol: "XIC".to_string(),
            category: Some("Canada".to_string()),
        }];
        let derived = derive_mappings(&ledger, &existing);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived[0].category.as_deref(), Some("Canada"));
        assert_eq!(derived[1].symbol, "ABC");
        assert_eq!(derived[1].category, None);
    }

    #[test]
    fn test_derive_is_idempotent() {
        let ledger = Ledger::Positions(vec![position("ABC", dec!(1), Some("USD"))]);
        let once = derive_mappings(&ledger, &[]);
        let twice = derive_mappings(&ledger, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_prune_drops_only_unreferenced() {
        let ledger = Ledger::Positions(vec![position("A", dec!(1), Some("USD"))]);
        let existing = vec![
            CurrencyEntry {
                code: "USD".to_string(),
                multiplier: Some(dec!(1.35)),
            },
            CurrencyEntry {
                code: "EUR".to_string(),
                multiplier: Some(dec!(1.5)),
            },
        ];
        let pruned = prune_currency_entries(&ledger, &existing);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].code, "USD");
    }

    #[test]
    fn test_from_value_missing_defaults_to_empty() {
        let ledger = Ledger::from_value(MergeMode::ByAccount, None).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_roundtrip_through_json() {
        let ledger = Ledger::Accounts(vec![account(
            "q:1",
            vec![position("XIC", dec!(100), Some("CAD"))],
        )]);
        let value = ledger.to_value().unwrap();
        let back = Ledger::from_value(MergeMode::ByAccount, Some(value)).unwrap();
        assert_eq!(back, ledger);
    }
}
