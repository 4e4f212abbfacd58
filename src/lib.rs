//! ledger_transfer - exactly-once fund transfers between ledger accounts
//!
//! # Modules
//!
//! - [`core_types`] - Shared aliases (AccountId, TransactionId, Amount) and limits
//! - [`store`] - Store error type and the call deadline helper
//! - [`account`] - Account entity, version-checked account stores, read projections
//! - [`transfer`] - Ledger log, transfer engine, recovery worker
//! - [`boundary`] - Inbound command validation and outbound views
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] / [`logging`] - Application wiring

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod boundary;
pub mod config;
pub mod db;
pub mod logging;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountQueryService, AccountStatus, AccountStore};
pub use core_types::{AccountId, Amount, TransactionId, Version};
pub use store::StoreError;
pub use transfer::{
    EngineConfig, LedgerStore, RecoveryWorker, ReplayPolicy, RequestContext, TransferEngine,
    TransferError, TransferRecord, TransferRequest, TransferStatus,
};
