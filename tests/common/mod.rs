#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::Secret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use payment_engine::catalog::{Plan, StaticPlanCatalog};
use payment_engine::config::{
    CashfreeConfig, Config, DatabaseConfig, OrderConfig, RazorpayConfig, ReconciliationConfig,
    SignatureConfig, UpiConfig,
};
use payment_engine::error::EngineError;
use payment_engine::models::{Order, OrderStatus, RemoteTransaction, WebhookData};
use payment_engine::services::{InMemoryStore, PaymentProvider, TransactionFilter};
use payment_engine::PaymentEngine;

pub const PREMIUM_PLAN: &str = "premium";
pub const PREMIUM_AMOUNT_MINOR: i64 = 9_900;
pub const TEST_USER: &str = "user-1";

/// Scripted provider adapter: hand it transactions, flip `fail` to simulate
/// an upstream outage.
pub struct FakeProvider {
    transactions: Mutex<Vec<RemoteTransaction>>,
    fail: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn push(&self, transaction: RemoteTransaction) {
        self.transactions.lock().unwrap().push(transaction);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<RemoteTransaction>, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Provider(anyhow::anyhow!(
                "provider unavailable"
            )));
        }
        let transactions = self.transactions.lock().unwrap();
        Ok(transactions
            .iter()
            .filter(|t| {
                filter.status.as_deref().map_or(true, |s| t.status == s)
                    && filter.since.map_or(true, |since| t.created_at >= since)
            })
            .cloned()
            .collect())
    }

    async fn fetch_transaction(
        &self,
        id: &str,
    ) -> Result<Option<RemoteTransaction>, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Provider(anyhow::anyhow!(
                "provider unavailable"
            )));
        }
        let transactions = self.transactions.lock().unwrap();
        Ok(transactions.iter().find(|t| t.id == id).cloned())
    }

    fn verify_signature(&self, _payload: &str, _signature: &str, _timestamp: Option<&str>) -> bool {
        true
    }
}

pub struct TestEngine {
    pub engine: PaymentEngine,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<FakeProvider>,
}

pub fn test_config() -> Config {
    Config {
        orders: OrderConfig { expiry_minutes: 30 },
        reconciliation: ReconciliationConfig {
            fuzzy_window_minutes: 5,
            amount_tolerance_minor: 100,
        },
        signature: SignatureConfig {
            freshness_seconds: 300,
        },
        upi: UpiConfig {
            vpa: "merchant@bank".to_string(),
            merchant_name: "IvanChat".to_string(),
        },
        razorpay: RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: Secret::new("rzp_test_secret".to_string()),
            webhook_secret: Secret::new("rzp_webhook_secret".to_string()),
            api_base_url: "https://api.razorpay.com/v1".to_string(),
        },
        cashfree: CashfreeConfig {
            client_id: "cf_test_id".to_string(),
            client_secret: Secret::new("cf_test_secret".to_string()),
            webhook_secret: Secret::new("cf_webhook_secret".to_string()),
            api_base_url: "https://api.cashfree.com/pg".to_string(),
        },
        database: DatabaseConfig {
            url: Secret::new("mongodb://localhost:27017".to_string()),
            db_name: "payment_test".to_string(),
        },
        service_name: "payment-engine-test".to_string(),
    }
}

pub fn spawn() -> TestEngine {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let catalog = Arc::new(StaticPlanCatalog::new(vec![Plan {
        id: PREMIUM_PLAN.to_string(),
        name: "Premium Membership".to_string(),
        amount_minor: PREMIUM_AMOUNT_MINOR,
        currency: "INR".to_string(),
    }]));

    let engine = PaymentEngine::build(
        &test_config(),
        store.clone(),
        provider.clone(),
        catalog,
    );

    TestEngine {
        engine,
        store,
        provider,
    }
}

/// Insert a pending order directly, with explicit timestamps.
pub async fn insert_pending_order(
    store: &InMemoryStore,
    amount_minor: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Order {
    use payment_engine::services::PaymentStore;

    let order = Order {
        id: Uuid::new_v4(),
        user_id: TEST_USER.to_string(),
        plan_id: PREMIUM_PLAN.to_string(),
        amount_minor,
        currency: "INR".to_string(),
        transaction_ref: format!("TXN{}", Uuid::new_v4().simple().to_string().to_uppercase()),
        status: OrderStatus::Pending,
        created_at,
        expires_at,
    };
    store.insert_order(&order).await.expect("insert order");
    order
}

pub async fn insert_fresh_pending_order(store: &InMemoryStore, amount_minor: i64) -> Order {
    let now = Utc::now();
    insert_pending_order(store, amount_minor, now, now + Duration::minutes(30)).await
}

pub fn webhook(transaction_ref: &str, provider_transaction_id: &str, amount_minor: i64) -> WebhookData {
    WebhookData {
        transaction_ref: transaction_ref.to_string(),
        provider_transaction_id: provider_transaction_id.to_string(),
        amount_minor,
        currency: "INR".to_string(),
        status: "success".to_string(),
    }
}

/// Remote transaction carrying an optional `transaction_ref` note.
pub fn remote_transaction(
    id: &str,
    amount_minor: i64,
    reference: Option<&str>,
    created_at: DateTime<Utc>,
) -> RemoteTransaction {
    let notes = match reference {
        Some(r) => serde_json::json!({ "transaction_ref": r }),
        None => serde_json::json!({}),
    };
    RemoteTransaction {
        id: id.to_string(),
        amount_minor,
        currency: "INR".to_string(),
        status: "success".to_string(),
        notes,
        created_at,
    }
}
