use checkout_reconciler::cli::{self, Cli, Commands, DbCommands, TxCommands};
use checkout_reconciler::config::{Config, LogFormat};
use checkout_reconciler::{create_app, db, AppState};
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Config) => cli::handle_config_validate(&config),
        Some(Commands::Tx(command)) => {
            let pool = db::create_pool(&config).await?;
            let state = AppState::from_pool(pool, &config);
            match command {
                TxCommands::Show { transaction_id } => {
                    cli::handle_tx_show(&state, &transaction_id).await
                }
                TxCommands::Refresh { transaction_id } => {
                    cli::handle_tx_refresh(&state, &transaction_id).await
                }
                TxCommands::Reconcile {
                    transaction_id,
                    force,
                } => cli::handle_tx_reconcile(&state, &transaction_id, force).await,
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let state = AppState::from_pool(pool, &config);
    tracing::info!(
        provider_api_url = %config.provider_api_url,
        journal = %config.payment_journal_code,
        "Checkout client initialized"
    );

    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
