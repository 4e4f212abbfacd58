//! Account management module
//!
//! Account entity, the version-checked account store (memory and PostgreSQL)
//! and read-only projections.

pub mod memory;
pub mod models;
pub mod pg;
pub mod query;
pub mod store;

// Re-export commonly used types
pub use memory::MemoryAccountStore;
pub use models::{Account, AccountStatus, BalanceError};
pub use pg::PgAccountStore;
pub use query::{AccountQueryService, QueryError};
pub use store::{AccountStore, Posting};

// Re-export Database from top-level db module
pub use crate::db::Database;
