//! Recovery Worker
//!
//! Background worker that settles transfers left PENDING by a crash or by an
//! unreachable ledger. The posting marker written together with the balances
//! decides the outcome: marker present means the money moved (SUCCESS),
//! marker absent means it never did (FAILURE).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::ledger::LedgerStore;
use super::types::{Outcome, TransferRecord};
use crate::account::AccountStore;
use crate::store::{self, StoreError};

/// Failure reason written for PENDING records whose balances never moved
pub const ABANDONED_REASON: &str = "abandoned: no balance mutation recorded";

/// Configuration for the recovery worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan for stale transfers
    pub scan_interval: Duration,
    /// How long a transfer must be PENDING to be considered stale
    pub stale_threshold: Duration,
    /// Maximum transfers to process per scan
    pub batch_size: usize,
    /// Deadline applied to every store call
    pub store_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(60),
            batch_size: 100,
            store_timeout: Duration::from_secs(2),
        }
    }
}

/// Counts from one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Posting found, finalized SUCCESS
    pub confirmed: usize,
    /// No posting, finalized FAILURE
    pub abandoned: usize,
    /// Already terminal or could not be resolved this round
    pub skipped: usize,
}

impl RecoveryReport {
    pub fn recovered(&self) -> usize {
        self.confirmed + self.abandoned
    }
}

pub struct RecoveryWorker {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
    config: WorkerConfig,
}

impl RecoveryWorker {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            accounts,
            ledger,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(accounts: Arc<dyn AccountStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self::new(accounts, ledger, WorkerConfig::default())
    }

    /// Run the recovery worker loop
    ///
    /// This method runs forever; stop it by dropping the future.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            batch_size = self.config.batch_size,
            "Starting recovery worker"
        );

        loop {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan and recovery cycle
    pub async fn scan_and_recover(&self) -> Result<RecoveryReport, StoreError> {
        let stale = self
            .bounded(
                self.ledger
                    .find_stale(self.config.stale_threshold, self.config.batch_size),
            )
            .await?;

        if stale.is_empty() {
            debug!("No stale transfers found");
            return Ok(RecoveryReport::default());
        }

        info!(count = stale.len(), "Found stale transfers to recover");

        let mut report = RecoveryReport::default();
        for record in &stale {
            match self.recover(record).await {
                Ok(Some(Outcome::Success)) => report.confirmed += 1,
                Ok(Some(Outcome::Failure(_))) => report.abandoned += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.skipped += 1;
                    error!(
                        transaction_id = record.transaction_id,
                        error = %e,
                        "Failed to recover transfer"
                    );
                }
            }
        }

        if report.recovered() > 0 {
            info!(
                confirmed = report.confirmed,
                abandoned = report.abandoned,
                "Recovered transfers this scan"
            );
        }

        Ok(report)
    }

    /// Settle one stale record. `None` when another writer finalized it first.
    async fn recover(&self, record: &TransferRecord) -> Result<Option<Outcome>, StoreError> {
        let posted = self
            .bounded(self.accounts.is_posted(record.transaction_id))
            .await?;

        let outcome = if posted {
            Outcome::Success
        } else {
            Outcome::failure(ABANDONED_REASON)
        };

        debug!(
            transaction_id = record.transaction_id,
            posted,
            age_secs = (chrono::Utc::now() - record.updated_on).num_seconds(),
            "Recovering transfer"
        );

        if self
            .bounded(self.ledger.finalize(record.transaction_id, &outcome))
            .await?
        {
            if posted {
                info!(
                    transaction_id = record.transaction_id,
                    "Stale transfer confirmed: balances had moved"
                );
            } else {
                warn!(
                    transaction_id = record.transaction_id,
                    "Stale transfer abandoned: balances never moved"
                );
            }
            Ok(Some(outcome))
        } else {
            debug!(
                transaction_id = record.transaction_id,
                "Transfer finalized concurrently, skipping"
            );
            Ok(None)
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        store::bounded(self.config.store_timeout, call).await
    }
}
