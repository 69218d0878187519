//! Payment order and reconciliation engine.
//!
//! Turns an intent to purchase a plan into a verified, exactly-once order
//! activation, despite an unreliable payment network: deep-link/QR transfers
//! confirmed by asynchronous webhooks, backstopped by a periodic
//! reconciliation sweep against the provider's transaction history.

pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use std::sync::Arc;

use catalog::PlanCatalog;
use config::Config;
use error::EngineError;
use services::{
    create_provider, MongoPaymentStore, OrderService, PaymentProcessor, PaymentProvider,
    PaymentStore, ReconciliationEngine, SignatureService, UpiService,
};

/// The engine's services, wired from one config and a shared store.
pub struct PaymentEngine {
    pub orders: OrderService,
    pub processor: PaymentProcessor,
    pub reconciliation: ReconciliationEngine,
    pub signatures: SignatureService,
    pub provider: Arc<dyn PaymentProvider>,
}

impl PaymentEngine {
    /// Wire the engine from explicit dependencies. Tests substitute an
    /// in-memory store and a scripted provider here.
    pub fn build(
        config: &Config,
        store: Arc<dyn PaymentStore>,
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<dyn PlanCatalog>,
    ) -> Self {
        let upi = UpiService::new(config.upi.clone());
        let orders = OrderService::new(store.clone(), catalog, upi, &config.orders);
        let processor = PaymentProcessor::new(store.clone(), &config.reconciliation);
        let reconciliation = ReconciliationEngine::new(
            store,
            provider.clone(),
            processor.clone(),
            orders.clone(),
            &config.reconciliation,
        );
        let signatures = SignatureService::new(config.signature.clone());

        Self {
            orders,
            processor,
            reconciliation,
            signatures,
            provider,
        }
    }

    /// Connect to MongoDB, create indexes, and wire the engine for the named
    /// provider.
    pub async fn connect(
        config: &Config,
        provider_name: &str,
        catalog: Arc<dyn PlanCatalog>,
    ) -> Result<Self, EngineError> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret())
            .await
            .map_err(EngineError::from)?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let store = MongoPaymentStore::new(&db);
        store.init_indexes().await?;

        let provider = create_provider(provider_name, config)?;
        tracing::info!(
            provider = provider_name,
            db = %config.database.db_name,
            "Payment engine initialized"
        );

        Ok(Self::build(config, Arc::new(store), provider, catalog))
    }
}

/// Install the standard tracing subscriber. Embedders that bring their own
/// subscriber skip this.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,payment_engine=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
