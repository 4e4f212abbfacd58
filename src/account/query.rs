//! Read-only account projections
//!
//! Nothing here writes; balances are read as last committed by the stores.

use std::sync::Arc;

use thiserror::Error;

use super::models::Account;
use super::store::AccountStore;
use crate::core_types::{AccountId, Amount};
use crate::store::StoreError;
use crate::transfer::{LedgerStore, TransferRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error(transparent)]
    Store(StoreError),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            QueryError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            QueryError::AccountNotFound(_) => 404,
            QueryError::Store(_) => 500,
        }
    }
}

pub struct AccountQueryService {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl AccountQueryService {
    pub fn new(accounts: Arc<dyn AccountStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { accounts, ledger }
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, QueryError> {
        self.accounts.get(account_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => QueryError::AccountNotFound(account_id),
            other => QueryError::Store(other),
        })
    }

    pub async fn get_balance(&self, account_id: AccountId) -> Result<Amount, QueryError> {
        Ok(self.get_account(account_id).await?.balance)
    }

    /// Ledger records where the account is either side, most recent first
    pub async fn get_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransferRecord>, QueryError> {
        self.get_account(account_id).await?;
        self.ledger
            .list_for_account(account_id)
            .await
            .map_err(QueryError::Store)
    }
}
