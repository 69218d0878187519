//! Persistence boundary.
//!
//! [`PaymentStore`] names the two atomicity contracts the engine's
//! correctness rests on:
//!
//! 1. order activation is a conditional update ("set paid only if currently
//!    pending"), never a blind write, and
//! 2. payment creation is keyed by `provider_transaction_id` with a
//!    uniqueness constraint, so concurrent duplicates collapse to one row.
//!
//! The MongoDB implementation maps both directly onto filtered `update_one`
//! and a unique index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Order, OrderStatus, Payment, ReconciliationLog};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), EngineError>;

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, EngineError>;

    async fn order_by_transaction_ref(
        &self,
        transaction_ref: &str,
    ) -> Result<Option<Order>, EngineError>;

    /// Pending orders with this exact amount created inside `[from, to]`,
    /// oldest first. Fuzzy-matching candidates.
    async fn pending_orders_by_amount(
        &self,
        amount_minor: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, EngineError>;

    /// Transition `pending -> paid`. Returns whether this call performed the
    /// transition; a `false` means someone else already moved the order.
    async fn mark_paid_if_pending(&self, id: Uuid) -> Result<bool, EngineError>;

    /// Transition `pending -> pending-review` for human follow-up.
    async fn mark_review_if_pending(&self, id: Uuid) -> Result<bool, EngineError>;

    /// Bulk-expire every pending order whose `expires_at` is before the
    /// cutoff. One atomic operation, no read-then-write per row. Returns the
    /// number of orders expired.
    async fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<u64, EngineError>;

    async fn payment_by_provider_transaction_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Payment>, EngineError>;

    /// Insert a payment row. Returns `false` when a payment with the same
    /// `provider_transaction_id` already exists (idempotency-key collision),
    /// leaving the existing row untouched.
    async fn insert_payment(&self, payment: &Payment) -> Result<bool, EngineError>;

    async fn append_log(&self, entry: &ReconciliationLog) -> Result<(), EngineError>;

    async fn logs_for_provider_transaction(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Vec<ReconciliationLog>, EngineError>;
}

#[derive(Clone)]
pub struct MongoPaymentStore {
    orders: Collection<Order>,
    payments: Collection<Payment>,
    logs: Collection<ReconciliationLog>,
}

impl MongoPaymentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            orders: db.collection("orders"),
            payments: db.collection("payments"),
            logs: db.collection("reconciliation_logs"),
        }
    }

    /// Create the indexes the atomicity contract depends on.
    pub async fn init_indexes(&self) -> Result<(), EngineError> {
        let ref_index = IndexModel::builder()
            .keys(doc! { "transaction_ref": 1 })
            .options(
                IndexOptions::builder()
                    .name("order_transaction_ref_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1, "expires_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("order_status_expiry_idx".to_string())
                    .build(),
            )
            .build();

        let fuzzy_index = IndexModel::builder()
            .keys(doc! { "status": 1, "amount_minor": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("order_fuzzy_match_idx".to_string())
                    .build(),
            )
            .build();

        self.orders
            .create_indexes([ref_index, status_index, fuzzy_index], None)
            .await?;

        // The idempotency key. Duplicate inserts fail with E11000.
        let provider_txn_index = IndexModel::builder()
            .keys(doc! { "provider_transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_provider_txn_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.payments.create_indexes([provider_txn_index], None).await?;

        let log_index = IndexModel::builder()
            .keys(doc! { "provider_transaction_id": 1, "timestamp": 1 })
            .options(
                IndexOptions::builder()
                    .name("log_provider_txn_idx".to_string())
                    .build(),
            )
            .build();

        self.logs.create_indexes([log_index], None).await?;

        tracing::info!("Payment engine indexes initialized");
        Ok(())
    }

    fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
        matches!(
            err.kind.as_ref(),
            ErrorKind::Write(WriteFailure::WriteError(write_err)) if write_err.code == 11000
        )
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert_order(&self, order: &Order) -> Result<(), EngineError> {
        self.orders.insert_one(order, None).await?;
        Ok(())
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, EngineError> {
        let order = self
            .orders
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?;
        Ok(order)
    }

    async fn order_by_transaction_ref(
        &self,
        transaction_ref: &str,
    ) -> Result<Option<Order>, EngineError> {
        let order = self
            .orders
            .find_one(doc! { "transaction_ref": transaction_ref }, None)
            .await?;
        Ok(order)
    }

    async fn pending_orders_by_amount(
        &self,
        amount_minor: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, EngineError> {
        let filter = doc! {
            "status": OrderStatus::Pending.as_str(),
            "amount_minor": amount_minor,
            "created_at": {
                "$gte": mongodb::bson::DateTime::from_chrono(from),
                "$lte": mongodb::bson::DateTime::from_chrono(to),
            },
        };
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();

        let cursor = self.orders.find(filter, Some(options)).await?;
        let orders: Vec<Order> = cursor.try_collect().await?;
        Ok(orders)
    }

    async fn mark_paid_if_pending(&self, id: Uuid) -> Result<bool, EngineError> {
        let filter = doc! {
            "_id": id.to_string(),
            "status": OrderStatus::Pending.as_str(),
        };
        let update = doc! { "$set": { "status": OrderStatus::Paid.as_str() } };
        let result = self.orders.update_one(filter, update, None).await?;
        Ok(result.modified_count > 0)
    }

    async fn mark_review_if_pending(&self, id: Uuid) -> Result<bool, EngineError> {
        let filter = doc! {
            "_id": id.to_string(),
            "status": OrderStatus::Pending.as_str(),
        };
        let update = doc! { "$set": { "status": OrderStatus::PendingReview.as_str() } };
        let result = self.orders.update_one(filter, update, None).await?;
        Ok(result.modified_count > 0)
    }

    async fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<u64, EngineError> {
        let filter = doc! {
            "status": OrderStatus::Pending.as_str(),
            "expires_at": { "$lt": mongodb::bson::DateTime::from_chrono(cutoff) },
        };
        let update = doc! { "$set": { "status": OrderStatus::Expired.as_str() } };
        let result = self.orders.update_many(filter, update, None).await?;
        Ok(result.modified_count)
    }

    async fn payment_by_provider_transaction_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Payment>, EngineError> {
        let payment = self
            .payments
            .find_one(
                doc! { "provider_transaction_id": provider_transaction_id },
                None,
            )
            .await?;
        Ok(payment)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<bool, EngineError> {
        match self.payments.insert_one(payment, None).await {
            Ok(_) => Ok(true),
            Err(err) if Self::is_duplicate_key(&err) => {
                tracing::debug!(
                    provider_transaction_id = %payment.provider_transaction_id,
                    "Duplicate payment insert collapsed by unique index"
                );
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn append_log(&self, entry: &ReconciliationLog) -> Result<(), EngineError> {
        self.logs.insert_one(entry, None).await?;
        Ok(())
    }

    async fn logs_for_provider_transaction(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Vec<ReconciliationLog>, EngineError> {
        let options = FindOptions::builder().sort(doc! { "timestamp": 1 }).build();
        let cursor = self
            .logs
            .find(
                doc! { "provider_transaction_id": provider_transaction_id },
                Some(options),
            )
            .await?;
        let logs: Vec<ReconciliationLog> = cursor.try_collect().await?;
        Ok(logs)
    }
}
