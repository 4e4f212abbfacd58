//! Account-to-account transfers
//!
//! # Architecture
//!
//! A transfer touches two stores:
//! - **Account store**: balances, version-checked writes, posting markers
//! - **Ledger store**: one record per idempotency key (PENDING → SUCCESS | FAILURE)
//!
//! # Record Lifecycle
//!
//! ```text
//! PENDING ──▶ SUCCESS
//!    │
//!    └─────▶ FAILURE (reason)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **At-Most-Once**: one ledger record per idempotency key; balances move
//!    at most once per record
//! 2. **Conservation**: a transfer changes the sum of all balances by zero
//! 3. **Terminal Is Final**: finalization is compare-and-set on PENDING
//! 4. **No Silent Pending**: PENDING records left by a crash are settled by
//!    the [`RecoveryWorker`]

pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod state;
pub mod types;
pub mod worker;


// Re-exports for convenience
pub use db::PgLedgerStore;
pub use engine::{EngineConfig, ReplayPolicy, TransferEngine};
pub use error::TransferError;
pub use ledger::LedgerStore;
pub use memory::MemoryLedgerStore;
pub use state::TransferStatus;
pub use types::{AccountSide, Outcome, RequestContext, TransferRecord, TransferRequest};
pub use worker::{ABANDONED_REASON, RecoveryReport, RecoveryWorker, WorkerConfig};
