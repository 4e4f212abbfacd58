//! Account entity and balance invariants

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::{AMOUNT_MAX, AccountId, Amount, Version};

/// Account status
///
/// Only `Active` accounts may have their balance mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Locked,
    Closed,
}

impl AccountStatus {
    /// Name stored in the `accounts.status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Locked => "LOCKED",
            AccountStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "LOCKED" => Ok(AccountStatus::Locked),
            "CLOSED" => Ok(AccountStatus::Closed),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

/// Rejections raised by [`Account::debit`] / [`Account::credit`].
///
/// A rejected call leaves the account untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("amount must be greater than zero, got {0}")]
    NonPositiveAmount(Amount),

    #[error("account {account_id} is not active (status {status})")]
    NotActive {
        account_id: AccountId,
        status: AccountStatus,
    },

    #[error("insufficient funds in account {account_id}: available={available}, required={required}")]
    Insufficient {
        account_id: AccountId,
        available: Amount,
        required: Amount,
    },

    #[error("balance overflow on account {0}")]
    Overflow(AccountId),
}

/// Ledger account
///
/// `version` is the value read from the store. Mutating the balance does not
/// touch it; the store bumps it when a version-checked save succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_id: AccountId,
    pub holder_name: String,
    pub balance: Amount,
    pub status: AccountStatus,
    pub version: Version,
    pub last_updated: DateTime<Utc>,
}

impl Account {
    /// New active account at version 0
    pub fn new(account_id: AccountId, holder_name: impl Into<String>, balance: Amount) -> Self {
        Self {
            account_id,
            holder_name: holder_name.into(),
            balance,
            status: AccountStatus::Active,
            version: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Remove `amount` from the balance. Never leaves the balance negative.
    pub fn debit(&mut self, amount: Amount) -> Result<(), BalanceError> {
        self.ensure_mutable(amount)?;

        if self.balance < amount {
            return Err(BalanceError::Insufficient {
                account_id: self.account_id,
                available: self.balance,
                required: amount,
            });
        }

        self.balance -= amount;
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Add `amount` to the balance.
    pub fn credit(&mut self, amount: Amount) -> Result<(), BalanceError> {
        self.ensure_mutable(amount)?;

        self.balance = self
            .balance
            .checked_add(amount)
            .filter(|b| *b <= AMOUNT_MAX)
            .ok_or(BalanceError::Overflow(self.account_id))?;
        self.last_updated = Utc::now();
        Ok(())
    }

    fn ensure_mutable(&self, amount: Amount) -> Result<(), BalanceError> {
        if amount <= Amount::ZERO {
            return Err(BalanceError::NonPositiveAmount(amount));
        }
        if !self.is_active() {
            return Err(BalanceError::NotActive {
                account_id: self.account_id,
                status: self.status,
            });
        }
        Ok(())
    }
}
