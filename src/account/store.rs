//! Account store seam
//!
//! Writes are version-checked: a save carries the version the caller read,
//! and the store rejects it with [`StoreError::VersionConflict`] when the
//! persisted row has moved on.

use async_trait::async_trait;

use super::models::Account;
use crate::core_types::{AccountId, Amount, TransactionId, Version};
use crate::store::StoreError;

/// Debit/credit pair applied for one ledger transaction.
///
/// `from` and `to` hold the already mutated balances; their `version` fields
/// still carry the versions that were read, which are the expected versions
/// for the write.
#[derive(Debug, Clone)]
pub struct Posting {
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub from: Account,
    pub to: Account,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Load an account. Missing id is [`StoreError::NotFound`].
    async fn get(&self, account_id: AccountId) -> Result<Account, StoreError>;

    /// Persist a single account if its stored version equals
    /// `expected_version`. Returns the row as stored (version bumped).
    async fn save(&self, account: &Account, expected_version: Version)
    -> Result<Account, StoreError>;

    /// Persist both sides of a posting all-or-nothing, each version-checked,
    /// and record the posting marker for `transaction_id`.
    ///
    /// A marker that already exists for the transaction is reported as
    /// [`StoreError::DuplicateKey`] and nothing is written.
    async fn apply_posting(&self, posting: &Posting) -> Result<(), StoreError>;

    /// Whether a posting marker exists for the transaction.
    async fn is_posted(&self, transaction_id: TransactionId) -> Result<bool, StoreError>;

    /// Register a new account (account-opening flows, fixtures).
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;
}
