//! In-memory [`PaymentStore`] honoring the same atomicity contract as the
//! MongoDB store. Used by tests and embedded setups.
//!
//! DashMap shard locks make the conditional status transitions atomic, and
//! the payments map is keyed by `provider_transaction_id`, so the entry API
//! gives the same collapse-to-one-row behavior as the unique index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Order, OrderStatus, Payment, ReconciliationLog};
use crate::services::repository::PaymentStore;

#[derive(Default)]
pub struct InMemoryStore {
    orders: DashMap<Uuid, Order>,
    /// transaction_ref -> order id, uniqueness enforced at insert.
    ref_index: DashMap<String, Uuid>,
    /// provider_transaction_id -> payment, the idempotency key.
    payments: DashMap<String, Payment>,
    logs: Mutex<Vec<ReconciliationLog>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), EngineError> {
        match self.ref_index.entry(order.transaction_ref.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::Storage(anyhow::anyhow!(
                    "duplicate transaction_ref: {}",
                    order.transaction_ref
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(order.id);
            }
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, EngineError> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn order_by_transaction_ref(
        &self,
        transaction_ref: &str,
    ) -> Result<Option<Order>, EngineError> {
        let Some(id) = self.ref_index.get(transaction_ref).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn pending_orders_by_amount(
        &self,
        amount_minor: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>, EngineError> {
        let mut candidates: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.status == OrderStatus::Pending
                    && order.amount_minor == amount_minor
                    && order.created_at >= from
                    && order.created_at <= to
            })
            .map(|entry| entry.value().clone())
            .collect();
        candidates.sort_by_key(|o| o.created_at);
        Ok(candidates)
    }

    async fn mark_paid_if_pending(&self, id: Uuid) -> Result<bool, EngineError> {
        if let Some(mut order) = self.orders.get_mut(&id) {
            if order.status == OrderStatus::Pending {
                order.status = OrderStatus::Paid;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn mark_review_if_pending(&self, id: Uuid) -> Result<bool, EngineError> {
        if let Some(mut order) = self.orders.get_mut(&id) {
            if order.status == OrderStatus::Pending {
                order.status = OrderStatus::PendingReview;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<u64, EngineError> {
        let mut expired = 0;
        for mut entry in self.orders.iter_mut() {
            let order = entry.value_mut();
            if order.status == OrderStatus::Pending && order.expires_at < cutoff {
                order.status = OrderStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn payment_by_provider_transaction_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Payment>, EngineError> {
        Ok(self
            .payments
            .get(provider_transaction_id)
            .map(|p| p.clone()))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<bool, EngineError> {
        match self.payments.entry(payment.provider_transaction_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(payment.clone());
                Ok(true)
            }
        }
    }

    async fn append_log(&self, entry: &ReconciliationLog) -> Result<(), EngineError> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| EngineError::Storage(anyhow::anyhow!("log store poisoned")))?;
        logs.push(entry.clone());
        Ok(())
    }

    async fn logs_for_provider_transaction(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Vec<ReconciliationLog>, EngineError> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| EngineError::Storage(anyhow::anyhow!("log store poisoned")))?;
        Ok(logs
            .iter()
            .filter(|l| l.provider_transaction_id == provider_transaction_id)
            .cloned()
            .collect())
    }
}
