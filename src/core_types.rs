//! Core types used throughout the system
//!
//! These are fundamental type aliases shared by the stores, the engine
//! and the query service.

/// Account ID - externally assigned, immutable, always >= 1.
///
/// # Usage:
/// - Primary key of the `accounts` table
/// - Key of the in-memory account map
pub type AccountId = i64;

/// Transaction ID - assigned by the ledger store, strictly increasing.
pub type TransactionId = i64;

/// Optimistic concurrency counter stored on every account row.
pub type Version = i64;

/// Money amount. Always fixed-point, never `f64`.
pub type Amount = rust_decimal::Decimal;

/// Maximum length of an idempotency key (matches the column width).
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 64;

/// Maximum length of a transfer description.
pub const MAX_DESCRIPTION_LEN: usize = 120;

/// Fraction digits accepted on transfer amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// Largest amount or balance the `NUMERIC(19,2)` columns can hold.
pub const AMOUNT_MAX: Amount =
    Amount::from_parts(0x89E7_FFFF, 0x8AC7_2304, 0, false, AMOUNT_SCALE);
