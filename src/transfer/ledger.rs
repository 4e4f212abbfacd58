//! Ledger log store seam
//!
//! Records are keyed uniquely by idempotency key. `create` is the second
//! idempotency safety net behind the engine's pre-check: a concurrent caller
//! with the same key gets [`StoreError::DuplicateKey`].

use std::time::Duration;

use async_trait::async_trait;

use super::types::{Outcome, TransferRecord, TransferRequest};
use crate::core_types::{AccountId, TransactionId};
use crate::store::StoreError;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn find_by_idempotency_key(&self, key: &str)
    -> Result<Option<TransferRecord>, StoreError>;

    /// Insert a PENDING record and assign its transaction id.
    async fn create(&self, request: &TransferRequest) -> Result<TransferRecord, StoreError>;

    /// Compare-and-set PENDING -> terminal.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// record was already terminal. Unknown id is [`StoreError::NotFound`].
    async fn finalize(
        &self,
        transaction_id: TransactionId,
        outcome: &Outcome,
    ) -> Result<bool, StoreError>;

    async fn get(&self, transaction_id: TransactionId)
    -> Result<Option<TransferRecord>, StoreError>;

    /// Records where the account is either side, most recent first.
    async fn list_for_account(&self, account_id: AccountId)
    -> Result<Vec<TransferRecord>, StoreError>;

    /// PENDING records not updated for at least `older_than`, oldest first.
    async fn find_stale(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StoreError>;
}
