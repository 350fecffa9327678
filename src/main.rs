use std::io::Read;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use rust_decimal::Decimal;
use tracing::info;

use pinsight::cli::{
    formatters, AccountCommands, Cli, Commands, CurrencyCommands, ExportCommands, MappingCommands,
};
use pinsight::config::Config;
use pinsight::engine::Engine;
use pinsight::export;
use pinsight::snapshot::ScrapeMessage;
use pinsight::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Ingest { file, dry_run } => handle_ingest(&file, dry_run).await,

        Commands::Show => {
            let engine = open_engine().await?;
            println!(
                "{}",
                formatters::format_allocations_table(
                    engine.allocation_result(),
                    engine.base_currency()
                )
            );
            Ok(())
        }

        Commands::Accounts { action } => match action {
            AccountCommands::List => {
                let engine = open_engine().await?;
                println!("{}", formatters::format_accounts_table(engine.ledger()));
                Ok(())
            }
            AccountCommands::Remove { id } => {
                let mut engine = open_engine().await?;
                if engine.remove_account(&id).await? {
                    println!("{} Removed account {}", "✓".green().bold(), id);
                } else {
                    println!("{} No account with id {}", "ℹ".blue().bold(), id);
                }
                Ok(())
            }
            AccountCommands::Toggle { id } => {
                let mut engine = open_engine().await?;
                match engine.toggle_account(&id).await? {
                    Some(true) => println!("{} Account {} hidden", "✓".green().bold(), id),
                    Some(false) => println!("{} Account {} visible", "✓".green().bold(), id),
                    None => println!("{} No account with id {}", "ℹ".blue().bold(), id),
                }
                Ok(())
            }
        },

        Commands::Currencies { action } => match action {
            CurrencyCommands::List => {
                let engine = open_engine().await?;
                println!("{}", formatters::format_currencies_table(engine.currencies()));
                Ok(())
            }
            CurrencyCommands::Set { code, multiplier } => {
                let multiplier: Decimal = multiplier
                    .parse()
                    .with_context(|| format!("'{multiplier}' is not a valid multiplier"))?;
                let mut engine = open_engine().await?;
                engine.update_currency(&code, multiplier).await?;
                println!(
                    "{} {} = {} per unit",
                    "✓".green().bold(),
                    code.to_uppercase(),
                    multiplier
                );
                Ok(())
            }
            CurrencyCommands::Remove { code } => {
                let mut engine = open_engine().await?;
                if engine.remove_currency(&code).await? {
                    println!("{} Removed currency {}", "✓".green().bold(), code.to_uppercase());
                } else {
                    println!("{} No currency entry for {}", "ℹ".blue().bold(), code.to_uppercase());
                }
                Ok(())
            }
            CurrencyCommands::Prune => {
                let mut engine = open_engine().await?;
                let removed = engine.prune_currencies().await?;
                println!("{} Pruned {} unreferenced entries", "✓".green().bold(), removed);
                Ok(())
            }
        },

        Commands::Mappings { action } => match action {
            MappingCommands::List => {
                let engine = open_engine().await?;
                println!("{}", formatters::format_mappings_table(engine.mappings()));
                Ok(())
            }
            MappingCommands::Set { symbol, category } => {
                let mut engine = open_engine().await?;
                engine.update_mapping(&symbol, &category).await?;
                println!(
                    "{} {} -> {}",
                    "✓".green().bold(),
                    symbol.to_uppercase(),
                    category
                );
                Ok(())
            }
            MappingCommands::Remove { symbol } => {
                let mut engine = open_engine().await?;
                if engine.remove_mapping(&symbol).await? {
                    println!("{} Removed mapping for {}", "✓".green().bold(), symbol.to_uppercase());
                } else {
                    println!("{} No mapping for {}", "ℹ".blue().bold(), symbol.to_uppercase());
                }
                Ok(())
            }
            MappingCommands::Prune => {
                let mut engine = open_engine().await?;
                let removed = engine.prune_mappings().await?;
                println!("{} Pruned {} unreferenced mappings", "✓".green().bold(), removed);
                Ok(())
            }
        },

        Commands::Export { action } => {
            let engine = open_engine().await?;
            let today = chrono::Local::now().date_naive();
            let (csv, path) = match action {
                ExportCommands::Portfolio { output } => (
                    engine.portfolio_csv()?,
                    output.unwrap_or_else(|| export::portfolio_filename(today)),
                ),
                ExportCommands::Allocations { output } => (
                    engine.allocations_csv()?,
                    output.unwrap_or_else(|| export::allocations_filename(today)),
                ),
            };
            std::fs::write(&path, csv).with_context(|| format!("failed to write {path}"))?;
            println!("{} Exported to {}", "✓".green().bold(), path);
            Ok(())
        }
    }
}

/// Handle snapshot ingestion: preview the scraped positions, then merge
/// into the ledger unless this is a dry run.
async fn handle_ingest(file_path: &str, dry_run: bool) -> Result<()> {
    info!("Ingesting snapshot from: {}", file_path);

    let json = if file_path == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read snapshot from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(file_path)
            .with_context(|| format!("failed to read snapshot file {file_path}"))?
    };

    let message = ScrapeMessage::from_json(&json)?;

    if let Some(diagnostic) = message.diagnostic() {
        if let Some(error) = &diagnostic.error {
            bail!("scrape failed: {error}");
        }
        if let Some(note) = &diagnostic.info {
            println!("{} {}", "ℹ".blue().bold(), note);
        }
    }

    let positions: Vec<_> = match &message {
        ScrapeMessage::Brokerage(payload) => {
            println!(
                "\n{} {} / {} ({} positions)\n",
                "✓".green().bold(),
                payload.account.brokerage,
                payload.account.name,
                payload.account.positions.len()
            );
            payload.account.positions.clone()
        }
        ScrapeMessage::Positions(positions) => {
            println!("\n{} Found {} positions\n", "✓".green().bold(), positions.len());
            positions.clone()
        }
    };

    let preview: Vec<_> = positions.iter().take(10).cloned().collect();
    println!("{}", formatters::format_positions_table(&preview));
    if positions.len() > 10 {
        println!("\n... and {} more positions", positions.len() - 10);
    }

    if dry_run {
        println!("\n{} Dry run - no changes saved", "ℹ".blue().bold());
        return Ok(());
    }

    let mut engine = open_engine().await?;
    engine.accept_snapshot(message).await?;

    println!("\n{} Snapshot merged!", "✓".green().bold());
    println!("  Positions tracked: {}", engine.ledger().position_count());

    let unresolved_currencies = engine
        .currencies()
        .iter()
        .filter(|c| !c.is_defined())
        .count();
    if unresolved_currencies > 0 {
        println!(
            "  {} currencies need a multiplier: run {}",
            unresolved_currencies.to_string().yellow(),
            "pinsight currencies set <CODE> <MULTIPLIER>".bold()
        );
    }
    let unresolved_mappings = engine.mappings().iter().filter(|m| !m.is_defined()).count();
    if unresolved_mappings > 0 {
        println!(
            "  {} symbols need a category: run {}",
            unresolved_mappings.to_string().yellow(),
            "pinsight mappings set <SYMBOL> <CATEGORY>".bold()
        );
    }

    Ok(())
}

async fn open_engine() -> Result<Engine> {
    let config = Config::load()?;
    let store = SqliteStore::open(&config.data_file()?)?;
    Engine::load(Arc::new(store), &config).await
}
