//! In-memory account store
//!
//! A single mutex guards rows and posting markers together, so a posting is
//! checked and applied atomically. Used by tests and the `memory` backend.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::models::Account;
use super::store::{AccountStore, Posting};
use crate::core_types::{AccountId, TransactionId, Version};
use crate::store::{Fault, FaultSlot, StoreError};

#[derive(Default)]
struct Accounts {
    rows: HashMap<AccountId, Account>,
    posted: HashSet<TransactionId>,
}

impl Accounts {
    fn check_version(&self, account_id: AccountId, expected: Version) -> Result<(), StoreError> {
        let current = self
            .rows
            .get(&account_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", account_id)))?;

        if current.version != expected {
            return Err(StoreError::VersionConflict {
                account_id,
                expected,
                actual: Some(current.version),
            });
        }
        Ok(())
    }

    fn write(&mut self, account: &Account) -> Account {
        let mut stored = account.clone();
        stored.version += 1;
        stored.last_updated = Utc::now();
        self.rows.insert(stored.account_id, stored.clone());
        stored
    }
}

#[derive(Default)]
pub struct MemoryAccountStore {
    state: Mutex<Accounts>,
    posting_fault: FaultSlot,
    lookup_fault: FaultSlot,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `accounts`
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap_or_else(|p| p.into_inner());
            for account in accounts {
                state.rows.insert(account.account_id, account);
            }
        }
        store
    }

    /// Fail, stall or drop the acknowledgement of the next `apply_posting`.
    pub fn arm_posting_fault(&self, fault: Fault) {
        self.posting_fault.arm(fault);
    }

    /// Fail or stall the next `is_posted`.
    pub fn arm_lookup_fault(&self, fault: Fault) {
        self.lookup_fault.arm(fault);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Accounts>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("account store lock poisoned".to_string()))
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, account_id: AccountId) -> Result<Account, StoreError> {
        self.lock()?
            .rows
            .get(&account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("account {}", account_id)))
    }

    async fn save(
        &self,
        account: &Account,
        expected_version: Version,
    ) -> Result<Account, StoreError> {
        let mut state = self.lock()?;
        state.check_version(account.account_id, expected_version)?;
        Ok(state.write(account))
    }

    async fn apply_posting(&self, posting: &Posting) -> Result<(), StoreError> {
        let fault = self.posting_fault.take();
        match &fault {
            Some(Fault::Stall(delay)) => tokio::time::sleep(*delay).await,
            Some(Fault::Reject(e)) => return Err(e.clone()),
            _ => {}
        }

        {
            let mut state = self.lock()?;

            if state.posted.contains(&posting.transaction_id) {
                return Err(StoreError::DuplicateKey(format!(
                    "posting for transaction {}",
                    posting.transaction_id
                )));
            }
            if posting.from.account_id == posting.to.account_id {
                return Err(StoreError::Unavailable(format!(
                    "posting {} debits and credits account {}",
                    posting.transaction_id, posting.from.account_id
                )));
            }

            // Check both sides before writing either
            state.check_version(posting.from.account_id, posting.from.version)?;
            state.check_version(posting.to.account_id, posting.to.version)?;

            state.write(&posting.from);
            state.write(&posting.to);
            state.posted.insert(posting.transaction_id);
        }

        match fault {
            Some(Fault::LoseAck(e)) => Err(e),
            _ => Ok(()),
        }
    }

    async fn is_posted(&self, transaction_id: TransactionId) -> Result<bool, StoreError> {
        match self.lookup_fault.take() {
            Some(Fault::Stall(delay)) => tokio::time::sleep(delay).await,
            Some(Fault::Reject(e)) | Some(Fault::LoseAck(e)) => return Err(e),
            None => {}
        }
        Ok(self.lock()?.posted.contains(&transaction_id))
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.rows.contains_key(&account.account_id) {
            return Err(StoreError::DuplicateKey(format!(
                "account {}",
                account.account_id
            )));
        }
        state.rows.insert(account.account_id, account.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Amount;
    use rust_decimal_macros::dec;

    fn store() -> MemoryAccountStore {
        MemoryAccountStore::with_accounts([
            Account::new(1, "alice", dec!(500.00)),
            Account::new(2, "bob", dec!(200.00)),
        ])
    }

    fn posting(store_from: Account, store_to: Account, amount: Amount) -> Posting {
        let mut from = store_from;
        let mut to = store_to;
        from.debit(amount).unwrap();
        to.credit(amount).unwrap();
        Posting {
            transaction_id: 10,
            amount,
            from,
            to,
        }
    }

    #[tokio::test]
    async fn test_get_missing_account() {
        let store = store();
        assert!(matches!(store.get(99).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_bumps_version() {
        let store = store();
        let mut alice = store.get(1).await.unwrap();
        alice.holder_name = "alice b".to_string();

        let saved = store.save(&alice, 0).await.unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(store.get(1).await.unwrap().holder_name, "alice b");
    }

    #[tokio::test]
    async fn test_save_with_stale_version_conflicts() {
        let store = store();
        let alice = store.get(1).await.unwrap();
        store.save(&alice, 0).await.unwrap();

        let err = store.save(&alice, 0).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                account_id: 1,
                expected: 0,
                actual: Some(1),
            }
        );
    }

    #[tokio::test]
    async fn test_save_missing_account_is_not_a_conflict() {
        let store = store();
        let ghost = Account::new(42, "ghost", dec!(1));
        assert!(matches!(
            store.save(&ghost, 0).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_posting_moves_both_balances() {
        let store = store();
        let p = posting(
            store.get(1).await.unwrap(),
            store.get(2).await.unwrap(),
            dec!(100.00),
        );

        store.apply_posting(&p).await.unwrap();

        let alice = store.get(1).await.unwrap();
        let bob = store.get(2).await.unwrap();
        assert_eq!(alice.balance, dec!(400.00));
        assert_eq!(bob.balance, dec!(300.00));
        assert_eq!((alice.version, bob.version), (1, 1));
        assert!(store.is_posted(10).await.unwrap());
        assert!(!store.is_posted(11).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_posting_conflict_on_credit_side_writes_nothing() {
        let store = store();
        let p = posting(
            store.get(1).await.unwrap(),
            store.get(2).await.unwrap(),
            dec!(100.00),
        );

        // Someone else touches bob first
        let bob = store.get(2).await.unwrap();
        store.save(&bob, 0).await.unwrap();

        let err = store.apply_posting(&p).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { account_id: 2, .. }
        ));
        assert_eq!(store.get(1).await.unwrap().balance, dec!(500.00));
        assert_eq!(store.get(1).await.unwrap().version, 0);
        assert!(!store.is_posted(10).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_posting_twice_is_duplicate() {
        let store = store();
        let p = posting(
            store.get(1).await.unwrap(),
            store.get(2).await.unwrap(),
            dec!(1.00),
        );
        store.apply_posting(&p).await.unwrap();

        assert!(matches!(
            store.apply_posting(&p).await,
            Err(StoreError::DuplicateKey(_))
        ));
        assert_eq!(store.get(1).await.unwrap().balance, dec!(499.00));
    }

    #[tokio::test]
    async fn test_lost_ack_still_applies() {
        let store = store();
        store.arm_posting_fault(Fault::LoseAck(StoreError::Unavailable("ack lost".into())));
        let p = posting(
            store.get(1).await.unwrap(),
            store.get(2).await.unwrap(),
            dec!(50.00),
        );

        assert!(store.apply_posting(&p).await.is_err());
        assert!(store.is_posted(10).await.unwrap());
        assert_eq!(store.get(2).await.unwrap().balance, dec!(250.00));
    }

    #[tokio::test]
    async fn test_insert_duplicate_account() {
        let store = store();
        let err = store
            .insert(&Account::new(1, "again", dec!(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        store.insert(&Account::new(3, "carol", dec!(0))).await.unwrap();
        assert_eq!(store.get(3).await.unwrap().holder_name, "carol");
    }
}
