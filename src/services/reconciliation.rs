//! Periodic reconciliation sweep.
//!
//! Pulls provider transaction history and replays the same matching and
//! activation logic the webhook path uses, so orders whose webhook was lost
//! or delayed still activate exactly once. Matching runs through an ordered
//! list of tiers; every attempt lands in the append-only audit log.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::ReconciliationConfig;
use crate::error::EngineError;
use crate::models::{
    MatchMethod, MatchResult, Order, PaymentOutcome, ReconcileOutcome, ReconcileSummary,
    ReconciliationLog, RemoteTransaction,
};
use crate::services::orders::OrderService;
use crate::services::processor::PaymentProcessor;
use crate::services::provider::{PaymentProvider, TransactionFilter};
use crate::services::repository::PaymentStore;

/// Fallback order for matching a remote transaction to a local order. Each
/// tier runs only when the previous one yields nothing.
const MATCH_TIERS: [MatchMethod; 3] = [
    MatchMethod::TransactionRef,
    MatchMethod::ProviderTransactionId,
    MatchMethod::Fuzzy,
];

pub struct ReconciliationEngine {
    store: Arc<dyn PaymentStore>,
    provider: Arc<dyn PaymentProvider>,
    processor: PaymentProcessor,
    orders: OrderService,
    fuzzy_window: Duration,
    /// Advanced only after a fully successful run, so an aborted run replays
    /// the same window. Replay is safe: every apply path is idempotent.
    checkpoint: Mutex<Option<DateTime<Utc>>>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        provider: Arc<dyn PaymentProvider>,
        processor: PaymentProcessor,
        orders: OrderService,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            provider,
            processor,
            orders,
            fuzzy_window: Duration::minutes(config.fuzzy_window_minutes),
            checkpoint: Mutex::new(None),
        }
    }

    /// One sweep: fetch settled provider transactions since the checkpoint,
    /// reconcile each, then expire overdue pending orders.
    ///
    /// A provider failure propagates immediately; nothing is checkpointed and
    /// the next scheduled run retries the same window wholesale.
    pub async fn reconcile_payments(&self) -> Result<ReconcileSummary, EngineError> {
        let mut checkpoint = self.checkpoint.lock().await;
        let run_started = Utc::now();

        let filter = TransactionFilter {
            status: Some("success".to_string()),
            since: *checkpoint,
        };
        let remote_transactions = self.provider.fetch_transactions(&filter).await?;

        tracing::info!(
            provider = self.provider.name(),
            count = remote_transactions.len(),
            since = ?*checkpoint,
            "Reconciliation sweep started"
        );

        let mut summary = ReconcileSummary::default();
        for remote in &remote_transactions {
            match self.reconcile_transaction(remote).await? {
                ReconcileOutcome::Matched { activated, .. } => {
                    summary.matched += 1;
                    if activated {
                        summary.activated += 1;
                    }
                }
                ReconcileOutcome::Unmatched => summary.unmatched += 1,
            }
        }

        summary.expired = self.orders.handle_expired_orders().await?;

        *checkpoint = Some(run_started);
        tracing::info!(
            matched = summary.matched,
            activated = summary.activated,
            unmatched = summary.unmatched,
            expired = summary.expired,
            "Reconciliation sweep finished"
        );
        Ok(summary)
    }

    /// Match one remote transaction through the tier list.
    pub async fn reconcile_transaction(
        &self,
        remote: &RemoteTransaction,
    ) -> Result<ReconcileOutcome, EngineError> {
        for tier in MATCH_TIERS {
            if let Some(outcome) = self.try_tier(tier, remote).await? {
                return Ok(outcome);
            }
        }

        self.store
            .append_log(&ReconciliationLog::new(
                &remote.id,
                None,
                None,
                MatchResult::NotFound,
                "no order matched at any tier",
            ))
            .await?;
        tracing::warn!(
            provider_transaction_id = %remote.id,
            amount_minor = remote.amount_minor,
            "Remote transaction unmatched, flagged for manual investigation"
        );
        Ok(ReconcileOutcome::Unmatched)
    }

    async fn try_tier(
        &self,
        tier: MatchMethod,
        remote: &RemoteTransaction,
    ) -> Result<Option<ReconcileOutcome>, EngineError> {
        match tier {
            MatchMethod::TransactionRef => {
                let Some(reference) = remote.reference() else {
                    return Ok(None);
                };
                let Some(order) = self.store.order_by_transaction_ref(&reference).await? else {
                    return Ok(None);
                };
                Ok(Some(
                    self.apply(remote, &order, MatchMethod::TransactionRef)
                        .await?,
                ))
            }
            MatchMethod::ProviderTransactionId => {
                let Some(payment) = self
                    .store
                    .payment_by_provider_transaction_id(&remote.id)
                    .await?
                else {
                    return Ok(None);
                };
                self.store
                    .append_log(&ReconciliationLog::new(
                        &remote.id,
                        Some(payment.order_id),
                        Some(MatchMethod::ProviderTransactionId),
                        MatchResult::Matched,
                        "provider transaction already recorded",
                    ))
                    .await?;
                Ok(Some(ReconcileOutcome::Matched {
                    method: MatchMethod::ProviderTransactionId,
                    activated: false,
                }))
            }
            MatchMethod::Fuzzy => {
                let candidates = self
                    .store
                    .pending_orders_by_amount(
                        remote.amount_minor,
                        remote.created_at - self.fuzzy_window,
                        remote.created_at + self.fuzzy_window,
                    )
                    .await?;
                let Some(order) = candidates.first() else {
                    return Ok(None);
                };
                if candidates.len() > 1 {
                    // First match wins, ordered by created_at. The conflict
                    // itself must land in the append-only audit log, not just
                    // the tracing output.
                    tracing::warn!(
                        provider_transaction_id = %remote.id,
                        candidates = candidates.len(),
                        chosen_order_id = %order.id,
                        "Multiple fuzzy candidates, oldest pending order wins"
                    );
                    self.store
                        .append_log(&ReconciliationLog::new(
                            &remote.id,
                            Some(order.id),
                            Some(MatchMethod::Fuzzy),
                            MatchResult::Matched,
                            format!(
                                "{} pending orders matched amount and window, oldest wins",
                                candidates.len()
                            ),
                        ))
                        .await?;
                }
                Ok(Some(self.apply(remote, order, MatchMethod::Fuzzy).await?))
            }
        }
    }

    /// Admin operation: reconcile one known provider transaction against one
    /// known order.
    pub async fn manual_reconcile(
        &self,
        order_id: Uuid,
        provider_transaction_id: &str,
    ) -> Result<ReconcileOutcome, EngineError> {
        let order = self
            .store
            .order_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Order not found".to_string()))?;

        let remote = self
            .provider
            .fetch_transaction(provider_transaction_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound("Transaction not found at provider".to_string())
            })?;

        let method = if remote.reference().as_deref() == Some(order.transaction_ref.as_str()) {
            MatchMethod::TransactionRef
        } else {
            MatchMethod::ProviderTransactionId
        };

        tracing::info!(
            order_id = %order.id,
            provider_transaction_id = %remote.id,
            method = method.as_str(),
            "Manual reconciliation"
        );
        self.apply(&remote, &order, method).await
    }

    /// Validate and activate through the exact webhook path, then record the
    /// audit entry for this tier.
    async fn apply(
        &self,
        remote: &RemoteTransaction,
        order: &Order,
        method: MatchMethod,
    ) -> Result<ReconcileOutcome, EngineError> {
        let webhook = crate::models::WebhookData {
            transaction_ref: order.transaction_ref.clone(),
            provider_transaction_id: remote.id.clone(),
            amount_minor: remote.amount_minor,
            currency: remote.currency.clone(),
            status: remote.status.clone(),
        };
        let outcome = self
            .processor
            .process_payment(&webhook, self.provider.name(), false)
            .await?;

        let (result, activated, details) = match outcome {
            PaymentOutcome::Activated => (
                MatchResult::Matched,
                true,
                format!("order activated via {} match", method.as_str()),
            ),
            PaymentOutcome::Duplicate => (
                MatchResult::Matched,
                false,
                "already processed".to_string(),
            ),
            PaymentOutcome::AmountMismatch => (
                MatchResult::AmountMismatch,
                false,
                format!(
                    "reported {} against expected {}",
                    remote.amount_minor, order.amount_minor
                ),
            ),
            PaymentOutcome::OrderClosed(status) => (
                MatchResult::Matched,
                false,
                format!("order not pending ({})", status.as_str()),
            ),
            // The order was loaded moments ago; a vanished ref means the
            // store is inconsistent, not that the match failed.
            PaymentOutcome::OrderNotFound => (
                MatchResult::NotFound,
                false,
                "order disappeared during reconciliation".to_string(),
            ),
        };

        self.store
            .append_log(&ReconciliationLog::new(
                &remote.id,
                Some(order.id),
                Some(method),
                result,
                details,
            ))
            .await?;

        if result == MatchResult::NotFound {
            return Ok(ReconcileOutcome::Unmatched);
        }
        Ok(ReconcileOutcome::Matched { method, activated })
    }
}
