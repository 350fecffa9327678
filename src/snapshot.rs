//! Scrape message contract
//!
//! Brokerage scrapers push one-shot messages after reading a page. The
//! richer form carries a full account snapshot plus a diagnostic; the
//! legacy form carries bare positions. Diagnostics are surfaced to the
//! user, never thrown: `info` is a soft degradation (e.g. a currency
//! column the scraper could not read), while a non-null `error` means the
//! page could not be read meaningfully and the snapshot must not be
//! ingested.

use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, Result};
use crate::ledger::SnapshotPayload;
use crate::models::{Account, Position};

/// Non-fatal scrape outcome attached to a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

/// One scraped brokerage account, as reported by the page scraper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawAccountSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brokerage: String,
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// The `brokerage` envelope of the richer message form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokeragePayload {
    pub account: RawAccountSnapshot,
    #[serde(default)]
    pub message: Diagnostic,
}

/// A complete scrape message in either supported form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeMessage {
    Brokerage(BrokeragePayload),
    Positions(Vec<Position>),
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    brokerage: Option<BrokeragePayload>,
    #[serde(default)]
    positions: Option<Vec<Position>>,
}

impl ScrapeMessage {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(json)
            .map_err(|e| PortfolioError::ParseError(format!("scrape message: {e}")))?;
        match (raw.brokerage, raw.positions) {
            (Some(brokerage), _) => Ok(ScrapeMessage::Brokerage(brokerage)),
            (None, Some(positions)) => Ok(ScrapeMessage::Positions(positions)),
            (None, None) => Err(PortfolioError::ParseError(
                "scrape message carries neither a brokerage account nor positions".to_string(),
            )
            .into()),
        }
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            ScrapeMessage::Brokerage(payload) => Some(&payload.message),
            ScrapeMessage::Positions(_) => None,
        }
    }

    /// Convert into a ledger payload, normalizing symbols and currency
    /// codes. Rejected when the scrape diagnostic reports an error.
    pub fn into_payload(self) -> Result<SnapshotPayload> {
        match self {
            ScrapeMessage::Brokerage(payload) => {
                if let Some(error) = payload.message.error {
                    return Err(PortfolioError::SnapshotRejected(error).into());
                }
                let snapshot = payload.account;
                Ok(SnapshotPayload::Account(Account {
                    id: snapshot.id,
                    name: snapshot.name,
                    brokerage: snapshot.brokerage,
                    positions: snapshot
                        .positions
                        .into_iter()
                        .map(Position::normalize)
                        .collect(),
                    hidden: false,
                }))
            }
            ScrapeMessage::Positions(positions) => Ok(SnapshotPayload::Positions(
                positions.into_iter().map(Position::normalize).collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BROKERAGE_MESSAGE: &str = r#"{
        "brokerage": {
            "account": {
                "id": "questrade:Margin",
                "name": "Margin",
                "brokerage": "Questrade",
                "positions": [
                    {"symbol": "vfv", "value": 100.5, "currency": "usd"},
                    {"symbol": "XIC", "value": "1,234.56", "currency": "CAD"}
                ]
            },
            "message": {"error": null, "info": "Currency column missing."}
        }
    }"#;

    #[test]
    fn test_parses_brokerage_form() {
        let message = ScrapeMessage::from_json(BROKERAGE_MESSAGE).unwrap();
        assert_eq!(
            message.diagnostic().unwrap().info.as_deref(),
            Some("Currency column missing.")
        );
        let SnapshotPayload::Account(account) = message.into_payload().unwrap() else {
            panic!("expected account payload");
        };
        assert_eq!(account.id, "questrade:Margin");
        assert_eq!(account.brokerage, "Questrade");
        assert!(!account.hidden);
        assert_eq!(account.positions[0].symbol, "VFV");
        assert_eq!(account.positions[0].currency.as_deref(), Some("USD"));
        assert_eq!(account.positions[1].value, dec!(1234.56));
    }

    #[test]
    fn test_parses_legacy_positions_form() {
        let message =
            ScrapeMessage::from_json(r#"{"positions": [{"symbol": "xic", "value": 10}]}"#)
                .unwrap();
        assert!(message.diagnostic().is_none());
        let SnapshotPayload::Positions(positions) = message.into_payload().unwrap() else {
            panic!("expected positions payload");
        };
        assert_eq!(positions[0].symbol, "XIC");
        assert_eq!(positions[0].currency, None);
    }

    #[test]
    fn test_error_diagnostic_rejects_ingestion() {
        let json = r#"{
            "brokerage": {
                "account": {"id": "x", "name": "x", "positions": []},
                "message": {"error": "No account name found.", "info": null}
            }
        }"#;
        let message = ScrapeMessage::from_json(json).unwrap();
        let err = message.into_payload().unwrap_err();
        assert!(err.to_string().contains("No account name found."));
    }

    #[test]
    fn test_empty_message_is_a_parse_error() {
        assert!(ScrapeMessage::from_json("{}").is_err());
        assert!(ScrapeMessage::from_json("not json").is_err());
    }
}
