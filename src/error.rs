//! Error handling for Pinsight
//!
//! Defines custom error types and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use thiserror::Error;

/// Core error types for portfolio operations
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("store error: {0}")]
    StoreError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("snapshot rejected: {0}")]
    SnapshotRejected(String),

    #[error("merge mode mismatch: {0}")]
    MergeModeMismatch(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for portfolio operations
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_is_readable() {
        let err = PortfolioError::StoreError("write failed".to_string());
        assert_eq!(err.to_string(), "store error: write failed");
    }

    #[test]
    fn test_anyhow_context_chains_errors() {
        use anyhow::Context;
        let result: Result<()> =
            Err(anyhow::anyhow!("original error")).context("failed to persist accounts");
        match result {
            Err(e) => {
                let msg = e.to_string();
                assert!(msg.contains("failed to persist accounts"));
                let debug_msg = format!("{:?}", e);
                assert!(debug_msg.contains("original error") || msg.contains("original error"));
            }
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_portfolio_error_variants() {
        let store_err = PortfolioError::StoreError("test".to_string());
        assert!(store_err.to_string().starts_with("store error"));

        let parse_err = PortfolioError::ParseError("test".to_string());
        assert!(parse_err.to_string().starts_with("parse error"));

        let rejected = PortfolioError::SnapshotRejected("test".to_string());
        assert!(rejected.to_string().starts_with("snapshot rejected"));
    }
}
