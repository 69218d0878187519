//! Domain models for the payment engine.
//!
//! Money is carried as integer minor units (paise for INR) everywhere inside
//! the engine; a two-decimal major-unit string is rendered only at the UPI
//! encoding boundary.

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minor units per major currency unit (paise per rupee).
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

// ============================================================================
// Order
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    PendingReview,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::PendingReview => "pending-review",
        }
    }
}

/// One purchase attempt. Created `pending`, moved at most once to a terminal
/// status, never deleted (kept for audit and support).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: String,
    /// Amount in minor units.
    pub amount_minor: i64,
    pub currency: String,
    /// Caller-generated unique token embedded in the payment intent.
    /// Immutable once created.
    pub transaction_ref: String,
    pub status: OrderStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Payment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
}

/// One confirmed provider transaction applied to an Order.
///
/// `provider_transaction_id` is the idempotency key: at most one `success`
/// Payment may exist per provider transaction, enforced by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub order_id: Uuid,
    pub transaction_ref: String,
    pub provider_transaction_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: String,
    pub signature_verified: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub processed_at: DateTime<Utc>,
}

// ============================================================================
// Reconciliation audit log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    TransactionRef,
    ProviderTransactionId,
    Fuzzy,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionRef => "transaction_ref",
            Self::ProviderTransactionId => "provider_transaction_id",
            Self::Fuzzy => "fuzzy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Matched,
    AmountMismatch,
    NotFound,
}

impl MatchResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::AmountMismatch => "amount_mismatch",
            Self::NotFound => "not_found",
        }
    }
}

/// Append-only audit entry written for every reconciliation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationLog {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub provider_transaction_id: String,
    pub order_id: Option<Uuid>,
    pub match_method: Option<MatchMethod>,
    pub match_result: MatchResult,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl ReconciliationLog {
    pub fn new(
        provider_transaction_id: &str,
        order_id: Option<Uuid>,
        match_method: Option<MatchMethod>,
        match_result: MatchResult,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_transaction_id: provider_transaction_id.to_string(),
            order_id,
            match_method,
            match_result,
            timestamp: Utc::now(),
            details: details.into(),
        }
    }
}

// ============================================================================
// Provider boundary
// ============================================================================

/// Normalized transaction as reported by a payment provider.
///
/// Amounts are already converted to minor units by the provider adapter;
/// that conversion happens exactly once, at this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTransaction {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    /// Free-form notes/metadata attached at payment time.
    pub notes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RemoteTransaction {
    /// Extract a local transaction reference from the provider notes, if the
    /// payment intent carried one through.
    pub fn reference(&self) -> Option<String> {
        let obj = self.notes.as_object()?;
        for key in ["transaction_ref", "tr", "reference"] {
            if let Some(value) = obj.get(key).and_then(|v| v.as_str()) {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        None
    }
}

/// Normalized webhook payload consumed by the processor. Provider-specific
/// envelope unwrapping (e.g. Razorpay's `payload.payment.entity`) happens
/// outside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    pub transaction_ref: String,
    pub provider_transaction_id: String,
    /// Amount in minor units, as providers report it.
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Structured result of applying a verified webhook to an order.
///
/// None of these are errors: callers decide acknowledgment behavior toward
/// the provider from the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The order transitioned `pending -> paid` and a Payment was recorded.
    Activated,
    /// This provider transaction was already processed. Idempotent no-op.
    Duplicate,
    /// No order carries this transaction ref yet; reconciliation will pick
    /// the transaction up later.
    OrderNotFound,
    /// Reported amount failed validation; the order moved to pending-review
    /// for human follow-up.
    AmountMismatch,
    /// The order already left `pending` by a non-payment route (expired or
    /// under review) and cannot be activated.
    OrderClosed(OrderStatus),
}

impl PaymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Activated | Self::Duplicate)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Aggregate counters returned by a reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub matched: u64,
    pub activated: u64,
    pub unmatched: u64,
    pub expired: u64,
}

/// Result of reconciling a single remote transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Matched {
        method: MatchMethod,
        activated: bool,
    },
    Unmatched,
}
