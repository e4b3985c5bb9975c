use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::domain::status::ReconciliationState;
use crate::domain::transaction::TransactionView;
use crate::AppState;

#[derive(Parser)]
#[command(name = "checkout-reconciler")]
#[command(about = "Mobile-money checkout and invoice reconciliation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction inspection and recovery
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Print a stored transaction
    Show {
        #[arg(value_name = "TRANSACTION_ID")]
        transaction_id: String,
    },
    /// Poll the provider and apply the current status
    Refresh {
        #[arg(value_name = "TRANSACTION_ID")]
        transaction_id: String,
    },
    /// Retry reconciliation of a completed transaction
    Reconcile {
        #[arg(value_name = "TRANSACTION_ID")]
        transaction_id: String,
        /// Take over a run left in progress by a crashed attempt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(state: &AppState, transaction_id: &str) -> anyhow::Result<()> {
    let tx = state
        .transactions
        .find_by_transaction_id(transaction_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", transaction_id))?;

    println!("{}", serde_json::to_string_pretty(&TransactionView::from(&tx))?);
    if let Some(error) = &tx.reconciliation_error {
        println!("Last reconciliation error: {}", error);
    }
    Ok(())
}

pub async fn handle_tx_refresh(state: &AppState, transaction_id: &str) -> anyhow::Result<()> {
    let output = state.refresh_status().execute(transaction_id).await?;

    if !output.refreshed {
        println!("! Provider not reachable, showing stored status");
    }
    println!(
        "Transaction {}: {} (reconciliation: {})",
        output.transaction.transaction_id,
        output.transaction.status,
        output.transaction.reconciliation_state
    );
    if let Some(Err(e)) = &output.reconciliation {
        anyhow::bail!("Reconciliation failed: {}: {}", e.kind(), e);
    }
    Ok(())
}

pub async fn handle_tx_reconcile(
    state: &AppState,
    transaction_id: &str,
    force: bool,
) -> anyhow::Result<()> {
    let outcome = state
        .sync
        .retry_reconciliation(transaction_id, force)
        .await?;

    match outcome.reconciliation {
        None => {
            tracing::info!(transaction_id, "Nothing to reconcile");
            println!(
                "Nothing to do: status {}, reconciliation {}",
                outcome.transaction.status, outcome.transaction.reconciliation_state
            );
            if !force && outcome.transaction.reconciliation_state == ReconciliationState::InProgress
            {
                println!("  a run is still marked in progress; rerun with --force to take it over");
            }
            Ok(())
        }
        Some(Ok(report)) => {
            println!("✓ Reconciliation {} for {}", report.state, transaction_id);
            if let Some(warning) = report.warning {
                println!("  warning: {}", warning);
            }
            Ok(())
        }
        Some(Err(e)) => anyhow::bail!("Reconciliation failed: {}: {}", e.kind(), e),
    }
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Provider API URL: {}", config.provider_api_url);
    println!("  Provider Label: {}", config.provider_label);
    println!("  Payment Journal: {}", config.payment_journal_code);
    println!("  Ledger Actor: {}", config.ledger_actor);
    println!(
        "  Provider Credentials: {}",
        if config.provider_api_key.is_some() {
            "environment"
        } else {
            "provider_configs table"
        }
    );

    config.validate()?;

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}
