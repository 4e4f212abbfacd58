//! Shared store error type and call-bounding helper
//!
//! Both the account store and the ledger store report failures through
//! [`StoreError`], so the engine can tell "row missing", "row raced" and
//! "store broken" apart without knowing which backend is in use.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::core_types::{AccountId, Version};

/// PostgreSQL SQLSTATE for unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("version conflict on account {account_id}: expected {expected}, found {actual:?}")]
    VersionConflict {
        account_id: AccountId,
        expected: Version,
        /// `None` when the backend cannot report the current version.
        actual: Option<Version>,
    },

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Infrastructure failures: the outcome of the call is unknown.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
                StoreError::DuplicateKey(db.message().to_string())
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Scripted failure for the in-memory stores
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail before touching any state
    Reject(StoreError),
    /// Apply the change, then report the error (lost acknowledgement)
    LoseAck(StoreError),
    /// Sleep before doing anything
    Stall(Duration),
}

/// One-shot fault holder. An armed fault fires on the next guarded call.
#[derive(Debug, Default)]
pub struct FaultSlot(Mutex<Option<Fault>>);

impl FaultSlot {
    pub fn arm(&self, fault: Fault) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault);
    }

    pub fn take(&self) -> Option<Fault> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Run a store call under a deadline.
///
/// An elapsed deadline becomes [`StoreError::Timeout`]; the inner future is
/// dropped, so the caller must treat the outcome as unknown.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
