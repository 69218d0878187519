//! Webhook application: idempotent, exactly-once order activation.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ReconciliationConfig;
use crate::error::EngineError;
use crate::models::{OrderStatus, Payment, PaymentOutcome, PaymentStatus, WebhookData};
use crate::services::repository::PaymentStore;

/// Whether a reported amount is acceptable for an expected amount, both in
/// minor units. The tolerance absorbs rounding from minor-unit conversions;
/// anything beyond it goes to human review.
pub fn validate_payment_amount(
    reported_minor: i64,
    expected_minor: i64,
    tolerance_minor: i64,
) -> bool {
    (reported_minor - expected_minor).abs() <= tolerance_minor
}

#[derive(Clone)]
pub struct PaymentProcessor {
    store: Arc<dyn PaymentStore>,
    tolerance_minor: i64,
}

impl PaymentProcessor {
    pub fn new(store: Arc<dyn PaymentStore>, config: &ReconciliationConfig) -> Self {
        Self {
            store,
            tolerance_minor: config.amount_tolerance_minor,
        }
    }

    pub fn validate_amount(&self, reported_minor: i64, expected_minor: i64) -> bool {
        validate_payment_amount(reported_minor, expected_minor, self.tolerance_minor)
    }

    /// Apply a verified webhook to its order.
    ///
    /// Safe under concurrent duplicate delivery and under a racing
    /// reconciliation pass: the order transition is a conditional update and
    /// the payment row is keyed by `provider_transaction_id`, so exactly one
    /// caller activates and everyone else observes [`PaymentOutcome::Duplicate`].
    pub async fn process_payment(
        &self,
        webhook: &WebhookData,
        provider: &str,
        signature_verified: bool,
    ) -> Result<PaymentOutcome, EngineError> {
        if let Some(existing) = self
            .store
            .payment_by_provider_transaction_id(&webhook.provider_transaction_id)
            .await?
        {
            if existing.status == PaymentStatus::Success {
                tracing::info!(
                    provider_transaction_id = %webhook.provider_transaction_id,
                    order_id = %existing.order_id,
                    "Duplicate webhook, already processed"
                );
                return Ok(PaymentOutcome::Duplicate);
            }
        }

        let Some(order) = self
            .store
            .order_by_transaction_ref(&webhook.transaction_ref)
            .await?
        else {
            tracing::warn!(
                transaction_ref = %webhook.transaction_ref,
                provider_transaction_id = %webhook.provider_transaction_id,
                "No order for webhook, leaving for reconciliation"
            );
            return Ok(PaymentOutcome::OrderNotFound);
        };

        if !self.validate_amount(webhook.amount_minor, order.amount_minor) {
            let moved = self.store.mark_review_if_pending(order.id).await?;
            tracing::warn!(
                order_id = %order.id,
                expected_minor = order.amount_minor,
                reported_minor = webhook.amount_minor,
                moved_to_review = moved,
                "Amount mismatch, order flagged for review"
            );
            return Ok(PaymentOutcome::AmountMismatch);
        }

        if self.store.mark_paid_if_pending(order.id).await? {
            let payment = Payment {
                id: Uuid::new_v4(),
                order_id: order.id,
                transaction_ref: order.transaction_ref.clone(),
                provider_transaction_id: webhook.provider_transaction_id.clone(),
                amount_minor: webhook.amount_minor,
                currency: webhook.currency.clone(),
                status: PaymentStatus::Success,
                provider: provider.to_string(),
                signature_verified,
                processed_at: Utc::now(),
            };
            if !self.store.insert_payment(&payment).await? {
                // Another writer recorded this provider transaction between
                // our idempotency check and the insert.
                return Ok(PaymentOutcome::Duplicate);
            }
            tracing::info!(
                order_id = %order.id,
                provider_transaction_id = %webhook.provider_transaction_id,
                amount_minor = webhook.amount_minor,
                "Order activated"
            );
            return Ok(PaymentOutcome::Activated);
        }

        // Lost the conditional update. Find out to whom.
        let current = self
            .store
            .order_by_id(order.id)
            .await?
            .map(|o| o.status)
            .unwrap_or(order.status);
        if current == OrderStatus::Paid {
            tracing::info!(
                order_id = %order.id,
                "Order already paid by a concurrent writer"
            );
            Ok(PaymentOutcome::Duplicate)
        } else {
            tracing::warn!(
                order_id = %order.id,
                status = current.as_str(),
                "Order left pending by a non-payment route, cannot activate"
            );
            Ok(PaymentOutcome::OrderClosed(current))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: i64 = 100;

    #[test]
    fn exact_amount_is_valid() {
        assert!(validate_payment_amount(10_000, 10_000, TOLERANCE));
    }

    #[test]
    fn one_paisa_short_is_within_tolerance() {
        // 99.99 reported against 100.00 expected.
        assert!(validate_payment_amount(9_999, 10_000, TOLERANCE));
    }

    #[test]
    fn five_units_short_is_rejected() {
        // 95 reported against 100 expected.
        assert!(!validate_payment_amount(9_500, 10_000, TOLERANCE));
    }

    #[test]
    fn tolerance_is_inclusive_and_symmetric() {
        assert!(validate_payment_amount(10_100, 10_000, TOLERANCE));
        assert!(validate_payment_amount(9_900, 10_000, TOLERANCE));
        assert!(!validate_payment_amount(10_101, 10_000, TOLERANCE));
    }
}
