use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use launch_indexer::services::chain_reader::AlloyChainReader;
use launch_indexer::services::launch_store::SeaOrmLaunchStore;
use launch_indexer::{IndexerConfig, LaunchIndexer};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,launch_indexer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match IndexerConfig::from_env() {
        Ok(Some(config)) => config,
        Ok(None) => {
            tracing::warn!(
                "FACTORY_ADDRESS not configured - launch indexer disabled. \
                 Deploy the factory and set FACTORY_ADDRESS to enable it."
            );
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid indexer configuration");
            return ExitCode::FAILURE;
        }
    };

    // Connect to database
    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::error!("DATABASE_URL must be set");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Connecting to database...");
    let db = match Database::connect(&database_url).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    // Run migrations
    tracing::info!("Running migrations...");
    if let Err(e) = migration::Migrator::up(&db, None).await {
        tracing::error!(error = %e, "Failed to run migrations");
        return ExitCode::FAILURE;
    }

    let reader = match AlloyChainReader::connect(&config.rpc).await {
        Ok(reader) => reader,
        Err(e) => {
            tracing::error!(error = %e, rpc_url = %config.rpc.rpc_url, "Failed to connect to RPC endpoint");
            return ExitCode::FAILURE;
        }
    };

    let indexer = LaunchIndexer::new(
        config.indexer,
        Arc::new(reader),
        Arc::new(SeaOrmLaunchStore::new(db.clone())),
    );

    if let Err(e) = indexer.run_until(shutdown_signal()).await {
        tracing::error!(error = %e, "Launch indexer failed to start");
        return ExitCode::FAILURE;
    }

    if let Err(e) = db.close().await {
        tracing::warn!(error = %e, "Failed to close database connection");
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
