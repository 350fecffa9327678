//! Portfolio engine
//!
//! The mediator between the persistent store, the reconciliation logic and
//! the allocation engine. It owns the in-memory state (ledger, currency
//! table, mapping table, last-computed allocations), reconciles the
//! auxiliary tables after every ledger change, and recomputes the
//! allocation breakdown wholesale whenever any input changes. Hosts drive
//! it single-threaded: each mutation runs to completion before the next.
//!
//! Persistence stores only *defined* currency/mapping entries; unresolved
//! placeholders are synthesized in memory on load and after each change.
//! Store change notifications (which include the engine's own writes) are
//! applied through [`Engine::apply_change_set`], which compares incoming
//! state against the current state and skips redundant recompute cycles —
//! the guard that keeps persistence from notifying itself forever.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::allocation::compute_allocations;
use crate::config::Config;
use crate::currency::normalize_code;
use crate::error::{PortfolioError, Result};
use crate::export;
use crate::ledger::{
    self, derive_currency_entries, derive_mappings, Ledger, MergeMode,
};
use crate::models::{AllocationResult, CurrencyEntry, Mapping};
use crate::snapshot::ScrapeMessage;
use crate::store::{
    ChangeSet, KeyValueStore, KEY_ACCOUNTS, KEY_CURRENCIES, KEY_CURRENCY_LEGACY, KEY_MAPPINGS,
};

pub struct Engine {
    store: Arc<dyn KeyValueStore>,
    base_currency: String,
    ledger: Ledger,
    currencies: Vec<CurrencyEntry>,
    mappings: Vec<Mapping>,
    allocations: AllocationResult,
    updated: watch::Sender<u64>,
}

impl Engine {
    /// Load persisted state, defaulting missing keys to empty containers,
    /// then reconcile the auxiliary tables and compute allocations.
    pub async fn load(store: Arc<dyn KeyValueStore>, config: &Config) -> Result<Self> {
        let mut values = store
            .get(&[
                KEY_ACCOUNTS,
                KEY_CURRENCIES,
                KEY_MAPPINGS,
                KEY_CURRENCY_LEGACY,
            ])
            .await
            .context("failed to load portfolio state")?;

        let ledger = Ledger::from_value(config.merge_mode, values.remove(KEY_ACCOUNTS))?;

        let mut currencies: Vec<CurrencyEntry> = match values.remove(KEY_CURRENCIES) {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| PortfolioError::ParseError(format!("stored currencies: {e}")))?,
            None => Vec::new(),
        };
        if currencies.is_empty() {
            if let Some(legacy) = values.remove(KEY_CURRENCY_LEGACY) {
                currencies = migrate_legacy_currency(&legacy);
            }
        }

        let mappings: Vec<Mapping> = match values.remove(KEY_MAPPINGS) {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| PortfolioError::ParseError(format!("stored mappings: {e}")))?,
            None => Vec::new(),
        };

        let (updated, _) = watch::channel(0u64);
        let mut engine = Self {
            store,
            base_currency: config.base_currency.clone(),
            ledger,
            currencies,
            mappings,
            allocations: AllocationResult::default(),
            updated,
        };
        engine.reconcile();
        engine.recompute();
        Ok(engine)
    }

    // -------- read surface --------

    /// The last-computed allocation breakdown. Valid until the next state
    /// change; recomputed from scratch on every change.
    pub fn allocation_result(&self) -> &AllocationResult {
        &self.allocations
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Currency table including unresolved placeholders.
    pub fn currencies(&self) -> &[CurrencyEntry] {
        &self.currencies
    }

    /// Mapping table including unresolved placeholders.
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.ledger.mode()
    }

    pub fn portfolio_csv(&self) -> Result<String> {
        export::portfolio_csv(&self.ledger, &self.currencies, &self.mappings)
    }

    pub fn allocations_csv(&self) -> Result<String> {
        export::allocations_csv(&self.allocations)
    }

    /// A counter bumped on every state change; hosts that render the
    /// dashboard subscribe to this single signal instead of per-field
    /// events.
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.updated.subscribe()
    }

    // -------- mutations --------

    /// Ingest a scrape message: merge its payload into the ledger, derive
    /// auxiliary entries for any new symbols/currencies, recompute and
    /// persist. A message whose diagnostic carries an error is rejected.
    pub async fn accept_snapshot(&mut self, message: ScrapeMessage) -> Result<()> {
        if let Some(diagnostic) = message.diagnostic() {
            if let Some(info) = &diagnostic.info {
                warn!(info, "scrape diagnostic");
            }
        }
        let payload = message.into_payload()?;
        self.ledger.merge(payload)?;
        self.reconcile();
        self.recompute();
        self.persist_ledger().await?;
        info!(positions = self.ledger.position_count(), "snapshot merged");
        Ok(())
    }

    /// Set (or overwrite) the multiplier for a currency code.
    pub async fn update_currency(&mut self, code: &str, multiplier: Decimal) -> Result<()> {
        let code = normalize_code(code);
        match self
            .currencies
            .iter_mut()
            .find(|c| c.code.eq_ignore_ascii_case(&code))
        {
            Some(entry) => entry.multiplier = Some(multiplier),
            None => self.currencies.push(CurrencyEntry {
                code,
                multiplier: Some(multiplier),
            }),
        }
        self.recompute();
        self.persist_currencies().await
    }

    /// Remove a currency entry. If the code is still referenced by the
    /// ledger an unresolved placeholder reappears immediately.
    pub async fn remove_currency(&mut self, code: &str) -> Result<bool> {
        let before = self.currencies.len();
        self.currencies.retain(|c| !c.code.eq_ignore_ascii_case(code));
        let removed = self.currencies.len() != before;
        if removed {
            self.reconcile();
            self.recompute();
            self.persist_currencies().await?;
        }
        Ok(removed)
    }

    /// Set (or overwrite) the category for a symbol.
    pub async fn update_mapping(&mut self, symbol: &str, category: &str) -> Result<()> {
        let symbol = symbol.trim().to_uppercase();
        let category = category.trim().to_string();
        match self.mappings.iter_mut().find(|m| m.symbol == symbol) {
            Some(mapping) => mapping.category = Some(category),
            None => self.mappings.push(Mapping {
                symbol,
                category: Some(category),
            }),
        }
        self.recompute();
        self.persist_mappings().await
    }

    /// Remove a mapping. Same placeholder behavior as currency removal.
    pub async fn remove_mapping(&mut self, symbol: &str) -> Result<bool> {
        let symbol = symbol.trim().to_uppercase();
        let before = self.mappings.len();
        self.mappings.retain(|m| m.symbol != symbol);
        let removed = self.mappings.len() != before;
        if removed {
            self.reconcile();
            self.recompute();
            self.persist_mappings().await?;
        }
        Ok(removed)
    }

    /// Remove an account from the ledger. Auxiliary entries for its
    /// symbols/currencies are kept (never-remove policy).
    pub async fn remove_account(&mut self, id: &str) -> Result<bool> {
        let Ledger::Accounts(accounts) = &mut self.ledger else {
            return Err(PortfolioError::MergeModeMismatch(
                "the flat ledger has no accounts to remove".to_string(),
            )
            .into());
        };
        let before = accounts.len();
        accounts.retain(|a| a.id != id);
        let removed = accounts.len() != before;
        if removed {
            self.recompute();
            self.persist_ledger().await?;
        }
        Ok(removed)
    }

    /// Toggle an account's hidden flag. Returns the new flag, or None when
    /// the account does not exist.
    pub async fn toggle_account(&mut self, id: &str) -> Result<Option<bool>> {
        let Ledger::Accounts(accounts) = &mut self.ledger else {
            return Err(PortfolioError::MergeModeMismatch(
                "the flat ledger has no accounts to toggle".to_string(),
            )
            .into());
        };
        let Some(account) = accounts.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        account.hidden = !account.hidden;
        let hidden = account.hidden;
        self.recompute();
        self.persist_ledger().await?;
        Ok(Some(hidden))
    }

    /// Explicit cleanup of currency entries no position references.
    pub async fn prune_currencies(&mut self) -> Result<usize> {
        let pruned = ledger::prune_currency_entries(&self.ledger, &self.currencies);
        let removed = self.currencies.len() - pruned.len();
        if removed > 0 {
            self.currencies = pruned;
            self.recompute();
            self.persist_currencies().await?;
        }
        Ok(removed)
    }

    /// Explicit cleanup of mappings no position references.
    pub async fn prune_mappings(&mut self) -> Result<usize> {
        let pruned = ledger::prune_mappings(&self.ledger, &self.mappings);
        let removed = self.mappings.len() - pruned.len();
        if removed > 0 {
            self.mappings = pruned;
            self.recompute();
            self.persist_mappings().await?;
        }
        Ok(removed)
    }

    // -------- change feed --------

    /// Apply a store change notification. Incoming values are compared
    /// against current state so the engine's own writes (which come back
    /// through the feed) are no-ops. Returns whether anything changed.
    pub fn apply_change_set(&mut self, changes: &ChangeSet) -> Result<bool> {
        let mut dirty = false;

        if let Some(change) = changes.get(KEY_ACCOUNTS) {
            let incoming = Ledger::from_value(self.ledger.mode(), change.new_value.clone())?;
            if incoming != self.ledger {
                self.ledger = incoming;
                dirty = true;
            }
        }

        if let Some(change) = changes.get(KEY_CURRENCIES) {
            let incoming: Vec<CurrencyEntry> = match change.new_value.clone() {
                Some(value) => serde_json::from_value(value)
                    .map_err(|e| PortfolioError::ParseError(format!("currencies change: {e}")))?,
                None => Vec::new(),
            };
            let own_defined: Vec<CurrencyEntry> = self
                .currencies
                .iter()
                .filter(|c| c.is_defined())
                .cloned()
                .collect();
            if incoming != own_defined {
                self.currencies = incoming;
                dirty = true;
            }
        }

        if let Some(change) = changes.get(KEY_MAPPINGS) {
            let incoming: Vec<Mapping> = match change.new_value.clone() {
                Some(value) => serde_json::from_value(value)
                    .map_err(|e| PortfolioError::ParseError(format!("mappings change: {e}")))?,
                None => Vec::new(),
            };
            let own_defined: Vec<Mapping> = self
                .mappings
                .iter()
                .filter(|m| m.is_defined())
                .cloned()
                .collect();
            if incoming != own_defined {
                self.mappings = incoming;
                dirty = true;
            }
        }

        if dirty {
            self.reconcile();
            self.recompute();
        } else {
            debug!("change notification matched current state, skipping");
        }
        Ok(dirty)
    }

    // -------- internals --------

    /// Keep the auxiliary tables consistent with the ledger's contents:
    /// synthesize unresolved entries for new codes/symbols, never remove.
    fn reconcile(&mut self) {
        self.currencies = derive_currency_entries(&self.ledger, &self.currencies);
        self.mappings = derive_mappings(&self.ledger, &self.mappings);
    }

    fn recompute(&mut self) {
        self.allocations = compute_allocations(&self.ledger, &self.mappings, &self.currencies);
        self.updated.send_modify(|v| *v += 1);
        debug!(
            categories = self.allocations.items.len(),
            total = %self.allocations.total,
            "allocations recomputed"
        );
    }

    async fn persist_ledger(&self) -> Result<()> {
        self.store
            .set(HashMap::from([(
                KEY_ACCOUNTS.to_string(),
                self.ledger.to_value()?,
            )]))
            .await
            .context("failed to persist ledger")
    }

    async fn persist_currencies(&self) -> Result<()> {
        let defined: Vec<&CurrencyEntry> =
            self.currencies.iter().filter(|c| c.is_defined()).collect();
        self.store
            .set(HashMap::from([(
                KEY_CURRENCIES.to_string(),
                serde_json::to_value(defined)?,
            )]))
            .await
            .context("failed to persist currencies")
    }

    async fn persist_mappings(&self) -> Result<()> {
        let defined: Vec<&Mapping> = self.mappings.iter().filter(|m| m.is_defined()).collect();
        self.store
            .set(HashMap::from([(
                KEY_MAPPINGS.to_string(),
                serde_json::to_value(defined)?,
            )]))
            .await
            .context("failed to persist mappings")
    }
}

/// Migrate the dashboard-era `currency` object: `conversions` held
/// divide-by rates (`normalized = value / rate`), so the equivalent
/// multiplier is its reciprocal.
fn migrate_legacy_currency(legacy: &serde_json::Value) -> Vec<CurrencyEntry> {
    let Some(conversions) = legacy.get("conversions").and_then(|c| c.as_array()) else {
        return Vec::new();
    };
    conversions
        .iter()
        .filter_map(|c| {
            let code = c.get("symbol").and_then(|s| s.as_str())?;
            let rate: Decimal = c.get("value")?.as_str().map_or_else(
                || c.get("value").and_then(|v| v.as_f64()).and_then(|f| Decimal::try_from(f).ok()),
                |s| s.parse().ok(),
            )?;
            if rate.is_zero() {
                return None;
            }
            Some(CurrencyEntry {
                code: normalize_code(code),
                multiplier: Some(Decimal::ONE / rate),
            })
        })
        .collect()
}
