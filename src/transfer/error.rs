//! Transfer Error Types
//!
//! One variant per failure kind the engine can report. The boundary layer maps
//! each variant to a transport status through [`TransferError::http_status`].

use thiserror::Error;

use super::types::AccountSide;
use crate::account::{AccountStatus, BalanceError};
use crate::core_types::{AccountId, Amount};
use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Client Errors (no ledger record) ===
    #[error("{side} account not found: {account_id}")]
    AccountNotFound {
        side: AccountSide,
        account_id: AccountId,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // === Business Rule Violations (ledger record finalized FAILURE) ===
    #[error("account not active: {side} account {account_id} is {status}")]
    AccountNotActive {
        side: AccountSide,
        account_id: AccountId,
        status: AccountStatus,
    },

    #[error("insufficient funds in account {account_id}: available={available}, required={required}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Amount,
        required: Amount,
    },

    // === Idempotency ===
    #[error("duplicate transfer: idempotency key already used: {0}")]
    DuplicateTransfer(String),

    // === Transient / Infrastructure ===
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            TransferError::InvalidRequest(_) => "INVALID_REQUEST",
            TransferError::AccountNotActive { .. } => "ACCOUNT_NOT_ACTIVE",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::DuplicateTransfer(_) => "DUPLICATE_TRANSFER",
            TransferError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            TransferError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            TransferError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InsufficientFunds { .. } => 400,
            TransferError::AccountNotActive { .. } => 403,
            TransferError::AccountNotFound { .. } => 404,
            TransferError::DuplicateTransfer(_) => 409,
            TransferError::InvalidRequest(_) => 422,
            TransferError::StoreUnavailable(_) | TransferError::Internal(_) => 500,
            TransferError::ConcurrencyConflict(_) => 503,
        }
    }

    /// Business rule violations that are captured into the ledger record
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            TransferError::AccountNotActive { .. } | TransferError::InsufficientFunds { .. }
        )
    }

    /// Retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::ConcurrencyConflict(_) | TransferError::StoreUnavailable(_)
        )
    }

    /// Map a balance rejection on the given leg
    pub(crate) fn from_balance(side: AccountSide, e: BalanceError) -> Self {
        match e {
            BalanceError::NonPositiveAmount(amount) => TransferError::InvalidRequest(format!(
                "amount must be greater than zero, got {}",
                amount
            )),
            BalanceError::NotActive { account_id, status } => TransferError::AccountNotActive {
                side,
                account_id,
                status,
            },
            BalanceError::Insufficient {
                account_id,
                available,
                required,
            } => TransferError::InsufficientFunds {
                account_id,
                available,
                required,
            },
            BalanceError::Overflow(account_id) => {
                TransferError::Internal(format!("balance overflow on account {}", account_id))
            }
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict { .. } => TransferError::ConcurrencyConflict(e.to_string()),
            StoreError::Timeout(_) | StoreError::Unavailable(_) => {
                TransferError::StoreUnavailable(e.to_string())
            }
            StoreError::NotFound(_) | StoreError::DuplicateKey(_) => {
                TransferError::Internal(e.to_string())
            }
        }
    }
}
