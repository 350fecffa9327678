//! Pinsight: portfolio aggregation with currency normalization.
//!
//! Brokerage scrapers push account snapshots; the engine reconciles them
//! into a deduplicated ledger, keeps the currency and category tables in
//! sync with the ledger's contents, and computes the portfolio's
//! allocation breakdown in a single base currency.

pub mod allocation;
pub mod cli;
pub mod config;
pub mod currency;
pub mod engine;
pub mod error;
pub mod export;
pub mod ledger;
pub mod models;
pub mod snapshot;
pub mod store;
