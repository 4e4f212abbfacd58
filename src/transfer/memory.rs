//! In-memory ledger store

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::ledger::LedgerStore;
use super::state::TransferStatus;
use super::types::{Outcome, TransferRecord, TransferRequest};
use crate::core_types::{AccountId, TransactionId};
use crate::store::{Fault, FaultSlot, StoreError};

#[derive(Default)]
struct Ledger {
    records: BTreeMap<TransactionId, TransferRecord>,
    by_key: HashMap<String, TransactionId>,
    last_id: TransactionId,
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<Ledger>,
    finalize_fault: FaultSlot,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail, stall or drop the acknowledgement of the next `finalize`.
    pub fn arm_finalize_fault(&self, fault: Fault) {
        self.finalize_fault.arm(fault);
    }

    /// Number of records, any status
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shift a record's timestamps into the past (ages it for recovery sweeps).
    pub fn backdate(&self, transaction_id: TransactionId, by: Duration) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let Ok(by) = chrono::Duration::from_std(by) else {
            return;
        };
        if let Some(record) = state.records.get_mut(&transaction_id) {
            record.created_on -= by;
            record.updated_on -= by;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransferRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .by_key
            .get(key)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn create(&self, request: &TransferRequest) -> Result<TransferRecord, StoreError> {
        let mut state = self.lock()?;
        if state.by_key.contains_key(&request.idempotency_key) {
            return Err(StoreError::DuplicateKey(request.idempotency_key.clone()));
        }

        state.last_id += 1;
        let record = TransferRecord::pending(state.last_id, request);
        state
            .by_key
            .insert(record.idempotency_key.clone(), record.transaction_id);
        state.records.insert(record.transaction_id, record.clone());
        Ok(record)
    }

    async fn finalize(
        &self,
        transaction_id: TransactionId,
        outcome: &Outcome,
    ) -> Result<bool, StoreError> {
        let fault = self.finalize_fault.take();
        match &fault {
            Some(Fault::Stall(delay)) => tokio::time::sleep(*delay).await,
            Some(Fault::Reject(e)) => return Err(e.clone()),
            _ => {}
        }

        let transitioned = {
            let mut state = self.lock()?;
            let record = state
                .records
                .get_mut(&transaction_id)
                .ok_or_else(|| StoreError::NotFound(format!("transfer {}", transaction_id)))?;

            if record.status.is_terminal() {
                false
            } else {
                record.resolve(outcome);
                true
            }
        };

        match fault {
            Some(Fault::LoseAck(e)) => Err(e),
            _ => Ok(transitioned),
        }
    }

    async fn get(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransferRecord>, StoreError> {
        Ok(self.lock()?.records.get(&transaction_id).cloned())
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        let state = self.lock()?;
        let mut records: Vec<TransferRecord> = state
            .records
            .values()
            .filter(|r| r.touches(account_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.created_on
                .cmp(&a.created_on)
                .then(b.transaction_id.cmp(&a.transaction_id))
        });
        Ok(records)
    }

    async fn find_stale(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| StoreError::Unavailable(format!("invalid stale threshold: {}", e)))?;
        let cutoff = Utc::now() - older_than;

        let state = self.lock()?;
        Ok(state
            .records
            .values()
            .filter(|r| r.status == TransferStatus::Pending && r.updated_on <= cutoff)
            .take(limit)
            .cloned()
            .collect())
    }
}
