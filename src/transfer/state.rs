//! Ledger record status
//!
//! ```text
//! PENDING ──▶ SUCCESS
//!    │
//!    └──────▶ FAILURE
//! ```
//!
//! A record is created PENDING before any balance is touched and moves to a
//! terminal status exactly once.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Recorded, balances not yet confirmed
    Pending,
    /// Terminal: both balances moved
    Success,
    /// Terminal: no balance moved, `failure_reason` is set
    Failure,
}

impl TransferStatus {
    /// Check if this is a terminal status (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    /// Name stored in the `transfer_records.status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Success => "SUCCESS",
            TransferStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "SUCCESS" => Ok(TransferStatus::Success),
            "FAILURE" => Ok(TransferStatus::Failure),
            other => Err(format!("unknown transfer status: {}", other)),
        }
    }
}
