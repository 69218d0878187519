//! Order lifecycle: creation and expiry.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::PlanCatalog;
use crate::config::OrderConfig;
use crate::error::EngineError;
use crate::models::{Order, OrderStatus};
use crate::services::repository::PaymentStore;
use crate::services::upi::UpiService;

/// What a client needs to pay: the intent link and its QR rendering, plus
/// the reference to poll status with.
#[derive(Debug, Clone)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub transaction_ref: String,
    pub amount_minor: i64,
    pub currency: String,
    pub upi_link: String,
    pub qr_image_base64: String,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn PaymentStore>,
    catalog: Arc<dyn PlanCatalog>,
    upi: UpiService,
    expiry: Duration,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        catalog: Arc<dyn PlanCatalog>,
        upi: UpiService,
        config: &OrderConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            upi,
            expiry: Duration::minutes(config.expiry_minutes),
        }
    }

    /// Create a pending order for a plan and hand back everything the client
    /// needs to complete payment out-of-band.
    pub async fn create_order(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<CreateOrderResponse, EngineError> {
        let plan = self
            .catalog
            .plan(plan_id)
            .ok_or_else(|| EngineError::Validation("Invalid plan selected".to_string()))?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            plan_id: plan.id.clone(),
            amount_minor: plan.amount_minor,
            currency: plan.currency.clone(),
            transaction_ref: new_transaction_ref(),
            status: OrderStatus::Pending,
            created_at: now,
            expires_at: now + self.expiry,
        };

        self.store.insert_order(&order).await.map_err(|e| {
            tracing::error!(error = %e, plan_id = %plan_id, "Failed to persist order");
            EngineError::Storage(anyhow::Error::new(e).context("Failed to create payment order"))
        })?;

        let upi_link = self.upi.payload_for_order(&order, &plan.name)?;
        let qr_image_base64 = self.upi.qr_png_base64(&upi_link)?;

        tracing::info!(
            order_id = %order.id,
            transaction_ref = %order.transaction_ref,
            amount_minor = order.amount_minor,
            expires_at = %order.expires_at,
            "Order created"
        );

        Ok(CreateOrderResponse {
            order_id: order.id,
            transaction_ref: order.transaction_ref,
            amount_minor: order.amount_minor,
            currency: order.currency,
            upi_link,
            qr_image_base64,
        })
    }

    /// Expire every overdue pending order in one bulk conditional update.
    pub async fn handle_expired_orders(&self) -> Result<u64, EngineError> {
        let expired = self.store.expire_pending_before(Utc::now()).await?;
        if expired > 0 {
            tracing::info!(count = expired, "Expired overdue pending orders");
        }
        Ok(expired)
    }
}

/// Fresh globally unique reference, alphanumeric and 35 characters, so it
/// survives the UPI `tr` field unmodified.
fn new_transaction_ref() -> String {
    format!("TXN{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::upi::UpiService;

    #[test]
    fn transaction_refs_fit_the_upi_field() {
        let reference = new_transaction_ref();
        assert_eq!(reference.len(), 35);
        assert!(UpiService::validate_transaction_ref(&reference));
    }

    #[test]
    fn transaction_refs_are_unique() {
        assert_ne!(new_transaction_ref(), new_transaction_ref());
    }
}
