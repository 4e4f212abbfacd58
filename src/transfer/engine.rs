//! Transfer Engine
//!
//! Drives one transfer from request to a finalized ledger record:
//!
//! ```text
//! validate ─▶ idempotency gate ─▶ load accounts ─▶ create PENDING
//!                                                       │
//!            ┌──────────────── spawned, not cancellable ┘
//!            ▼
//!     business rules ─▶ debit/credit ─▶ apply posting ─▶ finalize
//!            ▲                               │
//!            └──── reload on version conflict┘ (bounded)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Record-Before-Mutate**: the PENDING record exists before any balance moves
//! 2. **Change-Then-Confirm**: balances and the posting marker commit together;
//!    the ledger record is finalized afterwards
//! 3. **Unknown Is Not Failure**: a timed-out posting without a marker stays
//!    PENDING; the recovery sweep finalizes it once a late commit can no
//!    longer land

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::error::TransferError;
use super::ledger::LedgerStore;
use super::types::{AccountSide, Outcome, RequestContext, TransferRecord, TransferRequest};
use crate::account::{Account, AccountStore, Posting};
use crate::core_types::AccountId;
use crate::store::{self, StoreError};

/// What to do when an idempotency key has been seen before
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Any existing key is a `DuplicateTransfer`, including a prior success
    #[default]
    Reject,
    /// Return a terminal prior record unchanged when the request names the same
    /// accounts and amount. A PENDING or mismatched one is still a duplicate.
    ReturnPrior,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline applied to every store call
    pub store_timeout: Duration,
    /// Reload-and-retry budget for version conflicts
    pub max_conflict_retries: u32,
    pub replay_policy: ReplayPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
            max_conflict_retries: 3,
            replay_policy: ReplayPolicy::Reject,
        }
    }
}

/// Why a single settlement attempt did not go through
enum AttemptError {
    /// Nothing applied; finalize FAILURE with this error
    Rejected(TransferError),
    /// Nothing applied; another writer got there first
    Conflict(StoreError),
    /// Posting outcome unknown
    Unknown(StoreError),
}

#[derive(Clone)]
pub struct TransferEngine {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            accounts,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a transfer.
    ///
    /// Returns the finalized ledger record, or the typed failure. Business
    /// rule failures are written to the ledger before they are returned, so
    /// the same outcome can be looked up by idempotency key.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: TransferRequest,
    ) -> Result<TransferRecord, TransferError> {
        let span = info_span!(
            "transfer",
            correlation_id = %ctx.correlation_id,
            idempotency_key = %request.idempotency_key,
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: TransferRequest) -> Result<TransferRecord, TransferError> {
        request.validate()?;

        // 1. Idempotency gate
        if let Some(prior) = self
            .bounded(self.ledger.find_by_idempotency_key(&request.idempotency_key))
            .await?
        {
            return self.replay(prior, &request);
        }

        // 2. Resolve accounts
        let (from, to) = self.load_accounts(&request).await?;

        // 3. PENDING record before any balance moves
        let record = match self.bounded(self.ledger.create(&request)).await {
            Ok(record) => record,
            Err(StoreError::DuplicateKey(_)) => {
                info!("Lost idempotency race to a concurrent request");
                return Err(TransferError::DuplicateTransfer(request.idempotency_key));
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            transaction_id = record.transaction_id,
            "Ledger record created: {} -> {} amount={}",
            record.from_account_id,
            record.to_account_id,
            record.amount
        );

        // 4-7 on their own task: dropping the caller's future must not abandon
        // a record between mutation and finalization
        let engine = self.clone();
        let settlement =
            tokio::spawn(async move { engine.settle(record, request, from, to).await }.in_current_span());

        settlement
            .await
            .map_err(|e| TransferError::Internal(format!("settlement task failed: {}", e)))?
    }

    async fn settle(
        &self,
        record: TransferRecord,
        request: TransferRequest,
        mut from: Account,
        mut to: Account,
    ) -> Result<TransferRecord, TransferError> {
        let mut retries = 0;

        loop {
            match self.attempt(&record, &request, &from, &to).await {
                Ok(()) => return self.confirm(record).await,
                Err(AttemptError::Rejected(err)) => {
                    self.fail(&record, &err).await;
                    return Err(err);
                }
                Err(AttemptError::Conflict(cause)) => {
                    if retries >= self.config.max_conflict_retries {
                        let err = TransferError::ConcurrencyConflict(format!(
                            "gave up after {} retries: {}",
                            retries, cause
                        ));
                        self.fail(&record, &err).await;
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        transaction_id = record.transaction_id,
                        retry = retries,
                        cause = %cause,
                        "Version conflict, reloading accounts"
                    );
                    match self.load_accounts(&request).await {
                        Ok((fresh_from, fresh_to)) => {
                            from = fresh_from;
                            to = fresh_to;
                        }
                        Err(err) => {
                            self.fail(&record, &err).await;
                            return Err(err);
                        }
                    }
                }
                Err(AttemptError::Unknown(cause)) => return self.reconcile(record, cause).await,
            }
        }
    }

    /// Steps 4-6 against one snapshot of the two accounts
    async fn attempt(
        &self,
        record: &TransferRecord,
        request: &TransferRequest,
        from: &Account,
        to: &Account,
    ) -> Result<(), AttemptError> {
        // 4. Business rules
        check_business_rules(request, from, to).map_err(AttemptError::Rejected)?;

        // 5. Debit and credit on copies; nothing is written unless both pass
        let mut debited = from.clone();
        debited
            .debit(request.amount)
            .map_err(|e| AttemptError::Rejected(TransferError::from_balance(AccountSide::From, e)))?;
        let mut credited = to.clone();
        credited
            .credit(request.amount)
            .map_err(|e| AttemptError::Rejected(TransferError::from_balance(AccountSide::To, e)))?;

        // 6. Persist both sides, version-checked
        let posting = Posting {
            transaction_id: record.transaction_id,
            amount: request.amount,
            from: debited,
            to: credited,
        };

        match self.bounded(self.accounts.apply_posting(&posting)).await {
            Ok(()) => Ok(()),
            Err(StoreError::DuplicateKey(_)) => {
                warn!(
                    transaction_id = record.transaction_id,
                    "Posting already applied for this transaction"
                );
                Ok(())
            }
            Err(e @ StoreError::VersionConflict { .. }) => Err(AttemptError::Conflict(e)),
            Err(StoreError::NotFound(what)) => Err(AttemptError::Rejected(
                TransferError::Internal(format!("{} disappeared during posting", what)),
            )),
            Err(e) => Err(AttemptError::Unknown(e)),
        }
    }

    /// 7. Finalize SUCCESS
    async fn confirm(&self, mut record: TransferRecord) -> Result<TransferRecord, TransferError> {
        let outcome = Outcome::Success;

        match self
            .bounded(self.ledger.finalize(record.transaction_id, &outcome))
            .await
        {
            Ok(true) => {
                record.resolve(&outcome);
                info!(transaction_id = record.transaction_id, "Transfer succeeded");
                Ok(record)
            }
            Ok(false) => {
                // Finalized behind our back (recovery sweep)
                let stored = self
                    .bounded(self.ledger.get(record.transaction_id))
                    .await?
                    .ok_or_else(|| {
                        TransferError::Internal(format!(
                            "transfer {} vanished from the ledger",
                            record.transaction_id
                        ))
                    })?;
                if stored.status == outcome.status() {
                    return Ok(stored);
                }
                error!(
                    transaction_id = record.transaction_id,
                    status = %stored.status,
                    "Balances moved but ledger record was finalized differently"
                );
                Err(TransferError::Internal(format!(
                    "transfer {} applied but recorded as {}",
                    record.transaction_id, stored.status
                )))
            }
            Err(e) => {
                error!(
                    transaction_id = record.transaction_id,
                    error = %e,
                    "Balances moved but ledger record left PENDING; recovery sweep will confirm it"
                );
                Err(TransferError::StoreUnavailable(format!(
                    "transfer {} applied but not confirmed: {}",
                    record.transaction_id, e
                )))
            }
        }
    }

    /// 7. Finalize FAILURE. A failure to write it leaves the record PENDING.
    async fn fail(&self, record: &TransferRecord, err: &TransferError) {
        let outcome = Outcome::failure(err.to_string());

        match self
            .bounded(self.ledger.finalize(record.transaction_id, &outcome))
            .await
        {
            Ok(true) if err.is_business_rule() => warn!(
                transaction_id = record.transaction_id,
                code = err.code(),
                reason = %err,
                "Transfer rejected"
            ),
            Ok(true) => error!(
                transaction_id = record.transaction_id,
                code = err.code(),
                reason = %err,
                "Transfer failed"
            ),
            Ok(false) => warn!(
                transaction_id = record.transaction_id,
                "Ledger record already terminal, failure not recorded"
            ),
            Err(e) => error!(
                transaction_id = record.transaction_id,
                error = %e,
                reason = %err,
                "Could not record failure; record left PENDING for recovery"
            ),
        }
    }

    /// Posting outcome is unknown: let the posting marker decide.
    async fn reconcile(
        &self,
        record: TransferRecord,
        cause: StoreError,
    ) -> Result<TransferRecord, TransferError> {
        warn!(
            transaction_id = record.transaction_id,
            cause = %cause,
            "Posting outcome unknown, checking posting marker"
        );

        match self
            .bounded(self.accounts.is_posted(record.transaction_id))
            .await
        {
            Ok(true) => self.confirm(record).await,
            // A timed-out commit may still land; the sweep decides after stale_threshold
            Ok(false) if matches!(cause, StoreError::Timeout(_)) => {
                warn!(
                    transaction_id = record.transaction_id,
                    cause = %cause,
                    "Posting timed out with no marker yet; record left PENDING for recovery"
                );
                Err(TransferError::StoreUnavailable(cause.to_string()))
            }
            Ok(false) => {
                let err = TransferError::StoreUnavailable(cause.to_string());
                self.fail(&record, &err).await;
                Err(err)
            }
            Err(e) => {
                error!(
                    transaction_id = record.transaction_id,
                    cause = %cause,
                    error = %e,
                    "Posting outcome unknown; record left PENDING for recovery"
                );
                Err(TransferError::StoreUnavailable(cause.to_string()))
            }
        }
    }

    fn replay(
        &self,
        prior: TransferRecord,
        request: &TransferRequest,
    ) -> Result<TransferRecord, TransferError> {
        match self.config.replay_policy {
            ReplayPolicy::ReturnPrior if prior.status.is_terminal() && prior.matches(request) => {
                info!(
                    transaction_id = prior.transaction_id,
                    status = %prior.status,
                    "Idempotency key replayed, returning prior result"
                );
                Ok(prior)
            }
            ReplayPolicy::ReturnPrior if !prior.matches(request) => {
                warn!(
                    transaction_id = prior.transaction_id,
                    prior = %prior,
                    "Idempotency key reused for a different transfer"
                );
                Err(TransferError::DuplicateTransfer(prior.idempotency_key))
            }
            _ => {
                info!(
                    transaction_id = prior.transaction_id,
                    status = %prior.status,
                    "Duplicate transfer rejected"
                );
                Err(TransferError::DuplicateTransfer(prior.idempotency_key))
            }
        }
    }

    async fn load_accounts(
        &self,
        request: &TransferRequest,
    ) -> Result<(Account, Account), TransferError> {
        let from = self
            .load_account(AccountSide::From, request.from_account_id)
            .await?;
        let to = self
            .load_account(AccountSide::To, request.to_account_id)
            .await?;
        Ok((from, to))
    }

    async fn load_account(
        &self,
        side: AccountSide,
        account_id: AccountId,
    ) -> Result<Account, TransferError> {
        match self.bounded(self.accounts.get(account_id)).await {
            Ok(account) => Ok(account),
            Err(StoreError::NotFound(_)) => {
                Err(TransferError::AccountNotFound { side, account_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        store::bounded(self.config.store_timeout, call).await
    }
}

/// Business rules, in order. Shape rules repeat `TransferRequest::validate`
/// so the order holds even for callers that skip it.
fn check_business_rules(
    request: &TransferRequest,
    from: &Account,
    to: &Account,
) -> Result<(), TransferError> {
    if from.account_id == to.account_id {
        return Err(TransferError::InvalidRequest(
            "fromAccountId and toAccountId must be different".to_string(),
        ));
    }
    if request.amount <= crate::core_types::Amount::ZERO {
        return Err(TransferError::InvalidRequest(
            "amount must be greater than zero".to_string(),
        ));
    }
    for (side, account) in [(AccountSide::From, from), (AccountSide::To, to)] {
        if !account.is_active() {
            return Err(TransferError::AccountNotActive {
                side,
                account_id: account.account_id,
                status: account.status,
            });
        }
    }
    if from.balance < request.amount {
        return Err(TransferError::InsufficientFunds {
            account_id: from.account_id,
            available: from.balance,
            required: request.amount,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStatus;
    use rust_decimal_macros::dec;

    fn request(amount: rust_decimal::Decimal) -> TransferRequest {
        TransferRequest::new(1, 2, amount, "k")
    }

    #[test]
    fn test_rules_pass() {
        let from = Account::new(1, "a", dec!(100.00));
        let to = Account::new(2, "b", dec!(0));
        assert!(check_business_rules(&request(dec!(100.00)), &from, &to).is_ok());
    }

    #[test]
    fn test_rules_order_inactive_before_funds() {
        // Both rules are violated; the status rule is reported
        let from = Account::new(1, "a", dec!(1.00)).with_status(AccountStatus::Locked);
        let to = Account::new(2, "b", dec!(0));
        let err = check_business_rules(&request(dec!(100.00)), &from, &to).unwrap_err();
        assert!(matches!(
            err,
            TransferError::AccountNotActive {
                side: AccountSide::From,
                ..
            }
        ));
    }

    #[test]
    fn test_rules_inactive_target() {
        let from = Account::new(1, "a", dec!(100.00));
        let to = Account::new(2, "b", dec!(0)).with_status(AccountStatus::Closed);
        let err = check_business_rules(&request(dec!(1.00)), &from, &to).unwrap_err();
        assert!(matches!(
            err,
            TransferError::AccountNotActive {
                side: AccountSide::To,
                account_id: 2,
                status: AccountStatus::Closed,
            }
        ));
    }

    #[test]
    fn test_rules_insufficient_funds() {
        let from = Account::new(1, "a", dec!(99.99));
        let to = Account::new(2, "b", dec!(0));
        let err = check_business_rules(&request(dec!(100.00)), &from, &to).unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                account_id: 1,
                available: dec!(99.99),
                required: dec!(100.00),
            }
        );
    }

    #[test]
    fn test_rules_same_account_first() {
        let account = Account::new(1, "a", dec!(0)).with_status(AccountStatus::Locked);
        let req = TransferRequest::new(1, 1, dec!(5), "k");
        assert!(matches!(
            check_business_rules(&req, &account, &account),
            Err(TransferError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.store_timeout, Duration::from_secs(2));
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.replay_policy, ReplayPolicy::Reject);
    }
}
