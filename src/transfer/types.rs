//! Transfer Core Types

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::TransferError;
use super::state::TransferStatus;
use crate::core_types::{
    AMOUNT_MAX, AMOUNT_SCALE, AccountId, Amount, MAX_DESCRIPTION_LEN, MAX_IDEMPOTENCY_KEY_LEN,
    TransactionId,
};

/// Longest failure reason kept on a ledger record (column width)
pub const MAX_FAILURE_REASON_LEN: usize = 255;

/// Which leg of a transfer an account plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSide {
    From,
    To,
}

impl fmt::Display for AccountSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSide::From => f.write_str("from"),
            AccountSide::To => f.write_str("to"),
        }
    }
}

/// Request-scoped context passed down the call chain.
///
/// The correlation id ends up on the `transfer` tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: Uuid,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn with_correlation_id(correlation_id: Uuid) -> Self {
        Self { correlation_id }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Transfer request as handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
    pub idempotency_key: String,
    pub description: Option<String>,
}

impl TransferRequest {
    pub fn new(
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Amount,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
            idempotency_key: idempotency_key.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Request-shape rules. Checked before the idempotency gate, so a
    /// rejected request never produces a ledger record.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.from_account_id == self.to_account_id {
            return Err(TransferError::InvalidRequest(
                "fromAccountId and toAccountId must be different".to_string(),
            ));
        }
        if self.amount <= Amount::ZERO {
            return Err(TransferError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.amount.normalize().scale() > AMOUNT_SCALE {
            return Err(TransferError::InvalidRequest(format!(
                "amount must have at most {} fraction digits",
                AMOUNT_SCALE
            )));
        }
        if self.amount > AMOUNT_MAX {
            return Err(TransferError::InvalidRequest(format!(
                "amount must not exceed {}",
                AMOUNT_MAX
            )));
        }
        if self.from_account_id < 1 || self.to_account_id < 1 {
            return Err(TransferError::InvalidRequest(
                "account ids must be >= 1".to_string(),
            ));
        }

        let key = self.idempotency_key.as_str();
        if key.trim().is_empty() {
            return Err(TransferError::InvalidRequest(
                "idempotencyKey must not be blank".to_string(),
            ));
        }
        if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(TransferError::InvalidRequest(format!(
                "idempotencyKey must not exceed {} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }
        if key.chars().any(char::is_control) {
            return Err(TransferError::InvalidRequest(
                "idempotencyKey must not contain control characters".to_string(),
            ));
        }

        if let Some(description) = &self.description
            && description.chars().count() > MAX_DESCRIPTION_LEN
        {
            return Err(TransferError::InvalidRequest(format!(
                "description cannot exceed {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        Ok(())
    }
}

/// Terminal outcome written by `finalize`.
///
/// Carrying the reason inside `Failure` keeps "reason present iff FAILURE"
/// true by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    /// Failure outcome with a blank-safe, column-sized reason
    pub fn failure(reason: impl AsRef<str>) -> Self {
        let reason = reason.as_ref().trim();
        if reason.is_empty() {
            return Outcome::Failure("Unknown failure".to_string());
        }
        Outcome::Failure(reason.chars().take(MAX_FAILURE_REASON_LEN).collect())
    }

    pub fn status(&self) -> TransferStatus {
        match self {
            Outcome::Success => TransferStatus::Success,
            Outcome::Failure(_) => TransferStatus::Failure,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(reason) => Some(reason),
        }
    }
}

/// Ledger record: one per idempotency key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Store-assigned, monotonic
    pub transaction_id: TransactionId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
    pub status: TransferStatus,
    /// Present iff `status == Failure`
    pub failure_reason: Option<String>,
    pub idempotency_key: String,
    pub description: Option<String>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl TransferRecord {
    /// New PENDING record for `request` with a store-assigned id
    pub fn pending(transaction_id: TransactionId, request: &TransferRequest) -> Self {
        let now = Utc::now();
        Self {
            transaction_id,
            from_account_id: request.from_account_id,
            to_account_id: request.to_account_id,
            amount: request.amount,
            status: TransferStatus::Pending,
            failure_reason: None,
            idempotency_key: request.idempotency_key.clone(),
            description: request.description.clone(),
            created_on: now,
            updated_on: now,
        }
    }

    /// Whether this transfer debits or credits `account_id`
    pub fn touches(&self, account_id: AccountId) -> bool {
        self.from_account_id == account_id || self.to_account_id == account_id
    }

    /// Same accounts and amount as `request`
    pub fn matches(&self, request: &TransferRequest) -> bool {
        self.from_account_id == request.from_account_id
            && self.to_account_id == request.to_account_id
            && self.amount == request.amount
    }

    /// Apply a terminal outcome to this in-memory copy.
    pub(crate) fn resolve(&mut self, outcome: &Outcome) {
        self.status = outcome.status();
        self.failure_reason = outcome.reason().map(str::to_string);
        self.updated_on = Utc::now();
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} -> {} amount={} key={} status={}",
            self.transaction_id,
            self.from_account_id,
            self.to_account_id,
            self.amount,
            self.idempotency_key,
            self.status
        )
    }
}
