//! Credit ledger server binary

use credits_core::{Config, CreditLedger};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting credits-core server");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Open ledger
    let ledger = CreditLedger::open(config)?;
    let stats = ledger.storage_stats()?;
    tracing::info!(
        accounts = stats.total_accounts,
        entries = stats.total_entries,
        payouts = stats.total_payouts,
        "Ledger opened"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down credits-core server");
    ledger.shutdown().await?;
    Ok(())
}
