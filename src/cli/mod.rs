use clap::{Parser, Subcommand};

pub mod formatters;

#[derive(Parser)]
#[command(name = "pinsight")]
#[command(
    version,
    about = "Portfolio aggregation with currency normalization and category allocation"
)]
#[command(
    long_about = "Aggregate brokerage account snapshots into one ledger, normalize position values through a currency conversion table, map symbols to asset categories, and report the portfolio's allocation breakdown."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a scraped account snapshot (JSON file, or '-' for stdin)
    Ingest {
        /// Path to the snapshot JSON file
        file: String,

        /// Preview only, don't save to the ledger
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show the portfolio allocation breakdown
    Show,

    /// Account management
    Accounts {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Currency conversion table management
    Currencies {
        #[command(subcommand)]
        action: CurrencyCommands,
    },

    /// Symbol-category mapping management
    Mappings {
        #[command(subcommand)]
        action: MappingCommands,
    },

    /// Export portfolio data as CSV
    Export {
        #[command(subcommand)]
        action: ExportCommands,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// List tracked accounts with their position counts
    List,

    /// Remove an account from the ledger
    Remove {
        /// Account id (e.g., "questrade:Margin")
        id: String,
    },

    /// Toggle an account's hidden flag (display-only)
    Toggle {
        /// Account id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CurrencyCommands {
    /// List currency codes and their multipliers
    List,

    /// Set the multiplier for a currency code
    Set {
        /// Currency code (e.g., USD)
        code: String,

        /// Base-currency units per one unit of this currency
        multiplier: String,
    },

    /// Remove a currency entry
    Remove {
        /// Currency code
        code: String,
    },

    /// Drop entries no position references
    Prune,
}

#[derive(Subcommand)]
pub enum MappingCommands {
    /// List symbols and their categories
    List,

    /// Set the category for a symbol
    Set {
        /// Position symbol (e.g., VFV)
        symbol: String,

        /// Asset category (e.g., "Canadian Equity")
        category: String,
    },

    /// Remove a mapping
    Remove {
        /// Position symbol
        symbol: String,
    },

    /// Drop mappings no position references
    Prune,
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Export every position with normalized values and categories
    Portfolio {
        /// Output file (defaults to "<today> portfolio.csv")
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Export the allocation breakdown
    Allocations {
        /// Output file (defaults to "<today> allocations.csv")
        #[arg(short, long)]
        output: Option<String>,
    },
}
