//! ledger_transfer service
//!
//! Opens the configured stores and runs the recovery sweep until Ctrl-C.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────────┐
//! │  Config  │───▶│  Stores  │───▶│ Recovery Worker  │
//! │  (YAML)  │    │(mem | pg)│    │ (stale PENDING)  │
//! └──────────┘    └──────────┘    └──────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use ledger_transfer::account::{AccountStore, MemoryAccountStore, PgAccountStore};
use ledger_transfer::config::{AppConfig, StorageBackend};
use ledger_transfer::db::Database;
use ledger_transfer::logging::init_logging;
use ledger_transfer::transfer::{LedgerStore, MemoryLedgerStore, PgLedgerStore, RecoveryWorker};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

struct Stores {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
}

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory stores; all state is lost on exit");
            Ok(Stores {
                accounts: Arc::new(MemoryAccountStore::new()),
                ledger: Arc::new(MemoryLedgerStore::new()),
            })
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .postgres_url
                .as_deref()
                .context("storage.postgres_url is not set")?;
            let db = Database::connect(url, config.storage.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;
            db.ensure_schema().await.context("Failed to apply schema")?;

            Ok(Stores {
                accounts: Arc::new(PgAccountStore::new(db.pool().clone())),
                ledger: Arc::new(PgLedgerStore::new(db.pool().clone())),
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);

    info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        backend = ?config.storage.backend,
        "Starting ledger_transfer"
    );

    let stores = open_stores(&config).await?;
    info!(
        accounts = stores.accounts.name(),
        ledger = stores.ledger.name(),
        "Stores ready"
    );

    let worker = RecoveryWorker::new(stores.accounts, stores.ledger, config.worker_config());

    tokio::select! {
        _ = worker.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, stopping");
        }
    }

    Ok(())
}
