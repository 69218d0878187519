pub mod cashfree;
pub mod memory;
pub mod orders;
pub mod processor;
pub mod provider;
pub mod razorpay;
pub mod reconciliation;
pub mod repository;
pub mod signature;
pub mod upi;

pub use cashfree::CashfreeProvider;
pub use memory::InMemoryStore;
pub use orders::{CreateOrderResponse, OrderService};
pub use processor::{validate_payment_amount, PaymentProcessor};
pub use provider::{create_provider, PaymentProvider, TransactionFilter};
pub use razorpay::RazorpayProvider;
pub use reconciliation::ReconciliationEngine;
pub use repository::{MongoPaymentStore, PaymentStore};
pub use signature::{SignatureAlgorithm, SignatureService};
pub use upi::{UpiParams, UpiService};
