//! Request boundary types
//!
//! - `TransferCommand`: inbound "execute transfer" body (serde + `validator`)
//! - `resolve_idempotency_key`: body key > header key > generated
//! - `TransferView` / `AccountView` / `BalanceView`: outbound projections
//! - `ApiResponse`: response envelope, `code == 0` on success
//!
//! Authentication happens before anything in this module is called.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::account::{Account, AccountStatus, QueryError};
use crate::core_types::{AMOUNT_MAX, AMOUNT_SCALE, AccountId, Amount, TransactionId, Version};
use crate::transfer::{TransferError, TransferRecord, TransferRequest, TransferStatus};

/// Header carrying the idempotency key when the body does not
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

// ============================================================================
// TransferCommand: inbound
// ============================================================================

fn validate_amount(amount: &Amount) -> Result<(), ValidationError> {
    if *amount <= Amount::ZERO {
        return Err(ValidationError::new("amount_not_positive")
            .with_message("amount must be greater than zero".into()));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(ValidationError::new("amount_scale")
            .with_message(format!("amount must have at most {} fraction digits", AMOUNT_SCALE).into()));
    }
    if *amount > AMOUNT_MAX {
        return Err(ValidationError::new("amount_too_large")
            .with_message(format!("amount must not exceed {}", AMOUNT_MAX).into()));
    }
    Ok(())
}

/// "Execute transfer" request body
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransferCommand {
    #[validate(range(min = 1, message = "fromAccountId must be >= 1"))]
    pub from_account_id: AccountId,
    #[validate(range(min = 1, message = "toAccountId must be >= 1"))]
    pub to_account_id: AccountId,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Amount,
    /// Optional here; see [`resolve_idempotency_key`]
    #[serde(default)]
    #[validate(length(max = 64, message = "idempotencyKey must not exceed 64 characters"))]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    #[validate(length(max = 120, message = "description cannot exceed 120 characters"))]
    pub description: Option<String>,
}

/// Where the idempotency key of a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Body,
    Header,
    /// Client sent none; retries of this request are not deduplicated
    Generated,
}

/// Pick the idempotency key: body wins over header; blank counts as absent.
///
/// With neither present a UUID is generated and the request runs in degraded
/// mode, logged at warn.
pub fn resolve_idempotency_key(body: Option<&str>, header: Option<&str>) -> (String, KeySource) {
    let present = |k: Option<&str>| k.filter(|s| !s.trim().is_empty()).map(str::to_string);

    if let Some(key) = present(body) {
        return (key, KeySource::Body);
    }
    if let Some(key) = present(header) {
        return (key, KeySource::Header);
    }

    let key = Uuid::new_v4().to_string();
    warn!(
        idempotency_key = %key,
        "No idempotency key supplied; generated one, retries will not be deduplicated"
    );
    (key, KeySource::Generated)
}

impl TransferCommand {
    /// Validate field rules and build the engine request.
    ///
    /// `header_key` is the value of [`IDEMPOTENCY_KEY_HEADER`], if sent.
    pub fn into_request(
        self,
        header_key: Option<&str>,
    ) -> Result<(TransferRequest, KeySource), TransferError> {
        self.validate()
            .map_err(|e| TransferError::InvalidRequest(describe(&e)))?;

        let (key, source) = resolve_idempotency_key(self.idempotency_key.as_deref(), header_key);
        let mut request =
            TransferRequest::new(self.from_account_id, self.to_account_id, self.amount, key);
        if let Some(description) = self.description.filter(|d| !d.trim().is_empty()) {
            request = request.with_description(description);
        }

        // Header keys and generated keys go through the same shape rules
        request.validate()?;
        Ok((request, source))
    }
}

/// Flatten validator errors into one message, fields in name order
fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{} is invalid ({})", field, e.code),
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Views: outbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    pub transaction_id: TransactionId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl From<&TransferRecord> for TransferView {
    fn from(r: &TransferRecord) -> Self {
        Self {
            transaction_id: r.transaction_id,
            from_account_id: r.from_account_id,
            to_account_id: r.to_account_id,
            amount: r.amount,
            status: r.status,
            failure_reason: r.failure_reason.clone(),
            idempotency_key: r.idempotency_key.clone(),
            description: r.description.clone(),
            created_on: r.created_on,
            updated_on: r.updated_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub account_id: AccountId,
    pub holder_name: String,
    pub balance: Amount,
    pub status: AccountStatus,
    pub version: Version,
    pub last_updated: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(a: &Account) -> Self {
        Self {
            account_id: a.account_id,
            holder_name: a.holder_name.clone(),
            balance: a.balance,
            status: a.status,
            version: a.version,
            last_updated: a.last_updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub account_id: AccountId,
    pub balance: Amount,
}

// ============================================================================
// Response envelope
// ============================================================================

/// Unified response body
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// 0 for success, otherwise the HTTP status
    pub code: i32,
    /// "ok", or `<ERROR_CODE>: <message>`
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(status: u16, code: &str, message: impl std::fmt::Display) -> Self {
        Self {
            code: i32::from(status),
            msg: format!("{}: {}", code, message),
            data: None,
        }
    }
}

/// Status for a FAILURE record handed back by a replayed key
pub const REPLAYED_FAILURE_STATUS: u16 = 409;

/// Map an engine result to (HTTP status, body)
///
/// A FAILURE record only comes back as `Ok` from a replayed key. It answers
/// [`REPLAYED_FAILURE_STATUS`] with the record attached.
pub fn transfer_response(
    result: &Result<TransferRecord, TransferError>,
) -> (u16, ApiResponse<TransferView>) {
    match result {
        Ok(record) if record.status == TransferStatus::Failure => {
            let reason = record.failure_reason.as_deref().unwrap_or("Unknown failure");
            let mut body =
                ApiResponse::error(REPLAYED_FAILURE_STATUS, "TRANSFER_FAILED", reason);
            body.data = Some(TransferView::from(record));
            (REPLAYED_FAILURE_STATUS, body)
        }
        Ok(record) => (200, ApiResponse::success(TransferView::from(record))),
        Err(e) => (e.http_status(), ApiResponse::error(e.http_status(), e.code(), e)),
    }
}

/// Map a query error to (HTTP status, body)
pub fn query_error_response<T>(e: &QueryError) -> (u16, ApiResponse<T>) {
    (e.http_status(), ApiResponse::error(e.http_status(), e.code(), e))
}
